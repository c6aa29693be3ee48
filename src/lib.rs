//! # maestro-core
//!
//! Library core of an LLM agent orchestration engine: classifies and routes
//! incoming queries to specialized workers, keeps conversation context
//! inside a token budget through pruning and compaction, gates side-effecting
//! tool calls behind a human-in-the-loop confirmation state machine, and
//! executes approved batches with timeout, retry, and bounded concurrency.
//!
//! The crate is deliberately headless: LLM access, tool execution, and
//! summary persistence are traits ([`llm::provider::LLMProvider`],
//! [`exec::batch::ToolExecutor`], [`core::compaction::PersistenceHook`])
//! injected by the host application.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use maestro_core::config::CoreConfig;
//! use maestro_core::exec::CancelSignal;
//! use maestro_core::session::{Session, TurnOrchestrator};
//! # use maestro_core::llm::LLMProvider;
//! # use maestro_core::exec::ToolExecutor;
//! # async fn run(provider: Arc<dyn LLMProvider>, executor: Arc<dyn ToolExecutor>) {
//! let orchestrator = TurnOrchestrator::new(CoreConfig::default(), provider, executor);
//! let mut session = Session::new("session-1", "You are a coding assistant.");
//!
//! let mut plan = orchestrator.begin_turn(&mut session, "fix the failing test").await;
//! plan.approve_all();
//! let result = orchestrator
//!     .execute_approved(&mut session, &mut plan, &CancelSignal::none())
//!     .await;
//! orchestrator.complete_turn(&mut session, &plan, "Done.", result.success_count as u32, true);
//! orchestrator.prepare_context(&mut session).await;
//! # }
//! ```

pub mod config;
pub mod core;
pub mod exec;
pub mod llm;
pub mod session;

pub use config::CoreConfig;
pub use session::{Session, TurnOrchestrator, TurnPlan};
