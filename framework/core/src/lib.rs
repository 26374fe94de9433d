mod bail;
mod rng;
mod shutdown;

pub mod prelude {
    pub use crate::bail::{AgentBailError, IterationAbortError};
    pub use crate::rng::RandomSource;
    pub use crate::shutdown::{DelegatedShutdownListener, ShutdownHandle, ShutdownSignalError};
}
