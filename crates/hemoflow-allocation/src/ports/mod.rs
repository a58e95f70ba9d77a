//! Inbound and outbound ports for the allocation engine.

pub mod inbound;
pub mod outbound;

pub use inbound::FulfillmentApi;
pub use outbound::{
    FulfillmentStore, ManualTimeSource, NotificationSink, StoreError, StoreTxn, SystemTimeSource,
    TimeSource,
};
