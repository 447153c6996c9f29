//! Task Executor Module
//!
//! Everything the receiving member needs to turn an incoming task into running
//! code.
//!
//! ## Execution Model
//! 1. **Instantiation**: the receive loop asks the `TaskRegistry` for the handler
//!    named by the task and initializes the resulting object.
//! 2. **Scheduling**: the object is wrapped in a job and submitted to the
//!    `WorkerPool`, honouring the task's scheduling priority.
//! 3. **Deadlines**: a job that waits or runs past its execution timeout is
//!    canceled and told so through `run_canceled`.
//!
//! With zero workers there is no pool and the invocation service runs tasks
//! inline on its receive loop.
//!
//! ## Submodules
//! - **`registry`**: maps handler names (e.g. "echo") to task factories.
//! - **`pool`**: fixed-size worker pool with priorities and execution timeouts.

pub mod pool;
pub mod registry;

#[cfg(test)]
mod tests;
