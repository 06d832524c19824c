//! Dependency-ordered test scheduling.
//!
//! ## Architecture
//!
//! 1. **Builder** - Restricts the global dependency map to the selected tests
//! 2. **Cycle** - Rejects runs whose dependencies loop
//! 3. **Scheduler** - Test status and eligibility
//! 4. **Executor** - Runs eligible tests until no more progress is possible
//! 5. **State** - Summarizes executed and skipped tests into a report
//!
//! ## Example
//!
//! ```
//! use presubmit::dag::{RunBuilder, execute, summarize};
//! use std::collections::HashMap;
//!
//! let mut deps = HashMap::new();
//! deps.insert("unit".to_string(), vec!["build".to_string()]);
//! deps.insert("integration".to_string(), vec!["unit".to_string()]);
//!
//! let mut run = RunBuilder::new(["build", "unit", "integration"]).build(&deps);
//! run.validate().unwrap();
//!
//! let executed = execute(&mut run, |name| name != "unit");
//! let report = summarize(&run, &executed);
//!
//! assert_eq!(executed, vec!["build", "unit"]);
//! assert_eq!(report.skipped_names(), vec!["integration"]);
//! ```

mod builder;
mod cycle;
mod executor;
mod scheduler;
mod state;

pub use builder::{DroppedDependency, RunBuilder, TestIndex, TestRun, build_run};
pub use cycle::{detect_cycle, find_cycle};
pub use executor::{DagExecutor, ExecutionResult, ExecutorConfig, TestEvent, execute};
pub use scheduler::{TestNode, TestStatus};
pub use state::{ExecutedTest, ExecutionTimer, Report, SkippedTest, TestOutcome, summarize};
