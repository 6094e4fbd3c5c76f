//! Ornament Core - Ornament model, tree geometry, and store wire types
//!
//! This crate provides the platform-independent pieces of Ornament Tree:
//! - Ornament types and the append-only user set with echo de-duplication
//! - Cone-surface scatter, the decorative set, and ray picking against the tree
//! - The placement picker state machine, selection, and form submission
//! - Row decoding and endpoints for the hosted store
//! - Realtime channel frames for live insert notifications

pub mod error;
pub mod ornament;
pub mod placement;
pub mod realtime;
pub mod store;
pub mod tree;

pub use error::{ConfigError, FormError, FrameError, StoreError};
pub use ornament::{country_label, Ornament, OrnamentBook, OrnamentId, OrnamentKind, OrnamentRef, COUNTRIES, DEFAULT_COUNTRY};
pub use placement::{OrnamentForm, Placement, Selection};
pub use realtime::{ChannelEvent, InsertChannel};
pub use store::StoreConfig;
pub use tree::{TreeHit, TreeShape};
