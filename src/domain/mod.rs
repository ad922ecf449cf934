//! Domain model for the parcel synchronization pipeline
//!
//! Contains the entity/cursor types and the trait seams the engine consumes
//! (remote source, row store, search sink).

pub mod cursor;
pub mod parcel;
pub mod sync;

pub use cursor::{CursorAdvance, CursorValue, PARCEL_CURSOR_KIND};
pub use parcel::{Parcel, ParcelDocument, ParcelFragment, ParcelMetadata};
pub use sync::{ParcelSource, ParcelStore, SearchSink, SyncError};
