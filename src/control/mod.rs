pub mod controller;
pub mod state;

pub use controller::{AgentController, Collaborators};
pub use state::{ControlPlane, RunSignal};
