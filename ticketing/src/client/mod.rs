//! Client-side flows.
//!
//! Each flow is a reducer meant to run on a [`ticketmint_runtime::Store`]:
//!
//! - [`purchase`]: primary checkout through the relayer
//! - [`listing`]: resale listing signed by the holder's wallet
//! - [`resale`]: buying a listing with the buyer's wallet
//! - [`entry_pass`]: showing a server-issued venue pass with a countdown
//!
//! They talk to the backend through [`BackendApi`] and to the chain through
//! the user's own [`ticketmint_core::chain::ChainGateway`].

pub mod api;
pub mod entry_pass;
pub mod listing;
pub mod purchase;
pub mod resale;

pub use api::{BackendApi, ClientError, HttpBackend};
pub use entry_pass::{EntryPassAction, EntryPassEnvironment, EntryPassReducer, EntryPassState};
pub use listing::{ListingAction, ListingEnvironment, ListingPhase, ListingReducer, ListingRequest, ListingState};
pub use purchase::{
    PurchaseAction, PurchaseEnvironment, PurchasePhase, PurchaseReducer, PurchaseRequest, PurchaseState,
};
pub use resale::{ResaleAction, ResaleEnvironment, ResalePhase, ResaleReducer, ResaleState};
