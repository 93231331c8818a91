//! Notifier seam (spec §1: "Notification dispatch, treated as
//! `Notifier.Dispatch(event)`"). The fan-out bus (`fanout::FanoutBus`) is
//! this crate's own dispatch path to live subscriber connections; a
//! `Notifier` is for collaborators that need the same events delivered
//! somewhere other than a bus subscriber — email, paging, webhooks — and is
//! wired in by the binary embedding this crate, not implemented here.

use crate::model::EventUpdate;

pub type BoxFuture<'a, T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

pub trait Notifier: Send + Sync {
    fn dispatch(&self, event: EventUpdate) -> BoxFuture<'_, Result<(), String>>;
}
