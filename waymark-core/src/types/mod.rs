mod playbook;
mod policy;
mod session;
mod step;

pub use playbook::{PhaseSpec, Playbook};
pub use policy::{BreakerSpec, RateLimitSpec, RetrySpec};
pub use session::{AuthSpec, SessionSpec};
pub use step::{HttpMethod, OnError, RequestSpec, StepSpec};
