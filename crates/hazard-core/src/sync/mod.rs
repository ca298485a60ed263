//! Incremental sync between the remote store and local views
//!
//! A sync cycle pulls change notifications since the stored token, classifies
//! them into [`RecordChange`](crate::RecordChange) deltas, and publishes them
//! through the [`ChangeBroadcaster`]. Confirmed local saves and deletes are
//! published through the same channel. Each [`LiveView`] applies what it
//! receives with its own [`Reconciler`].

mod broadcaster;
mod engine;
mod fetcher;
mod reconciler;
mod view;

pub use broadcaster::{ChangeBroadcaster, Subscription};
pub use engine::{SyncEngine, SyncSummary};
pub use fetcher::{DeltaFetcher, FetchedChanges};
pub use reconciler::{
    ApplyReport, LocalCollection, Reconciler, ReportComparator, ReportFilter, ViewSource,
    ViewSpec,
};
pub use view::LiveView;
