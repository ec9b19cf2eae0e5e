pub mod engine;
pub mod states;

pub use engine::{RequestLifecycle, Transition, TRANSITIONS};
pub use states::{ActorRule, RequestAction, RequestCommand, TransitionOutcome, TransitionRule};
