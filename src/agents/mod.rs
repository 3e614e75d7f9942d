//! Conversational decision components.
//!
//! The router picks a specialty; the specialist gathers details and decides
//! when to hand over to triage. Both turn every model failure into a
//! follow-up question.

pub mod router;
pub mod specialist;
pub mod specialties;

pub use router::{RouterAgent, RouterDecision};
pub use specialist::{SpecialistAgent, SpecialistDecision};
pub use specialties::SpecialtyRegistry;
