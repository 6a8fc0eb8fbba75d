//! Composition layer for the athlete dashboard.
//!
//! Independently built features mount into one page and cooperate only
//! through an [`EventBus`]. The [`DashboardShell`] owns the page-lifetime
//! pieces and wires them together:
//!
//! - [`bus`]: synchronous publish/subscribe, bridged to `dashboard:*`
//!   document events
//! - [`modal`]: single-active-modal state machine
//! - [`registry`]: frozen feature descriptors with derived accessibility
//! - [`router`]: resolves, mounts and unmounts the current feature
//! - [`dom`]: the document seam, with a headless [`MemoryDocument`]
//! - [`boundary`]: the data-boundary contract and request queue

pub mod boundary;
pub mod bus;
pub mod dom;
pub mod error;
pub mod feature;
pub mod modal;
pub mod registry;
pub mod router;
pub mod shell;
pub mod topic;

pub use boundary::{ApiResponse, Completion, DataBoundary, RequestKind, RequestQueue};
pub use bus::{Event, EventBus, Handler, Origin, Subscription, in_handler};
pub use dom::{Document, DomEvent, Element, MemoryDocument, Tag};
pub use error::{BoundaryError, DashboardError, FeatureError, HandlerError, HandlerResult};
pub use feature::{Feature, MountContext, Requester};
pub use modal::{ButtonAction, ModalButton, ModalManager, ModalSize, ModalSpec, ModalState};
pub use registry::{
    ADMIN_ROLE, FeatureDescriptor, FeatureEntry, FeatureRegistry, RegistryBuilder, UserContext,
};
pub use router::{
    DEFAULT_FEATURE, FeatureRouter, Generation, GenerationGuard, ROUTE_PARAM,
    route_param_from_query,
};
pub use shell::{DashboardShell, ShellOptions};
pub use topic::{FeatureAction, Payload, PayloadKind, Topic};
