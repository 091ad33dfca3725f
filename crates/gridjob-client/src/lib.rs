//! gridjob-client — the caller side of the GridJob control plane.
//!
//! A [`GridClient`] hands out [`JobHandle`]s. Each handle owns a
//! [`ResourceBundle`], a job state machine and a [`JobControlService`]
//! running on the job's private [`WorkerPool`].
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use gridjob_client::GridClient;
//! use gridjob_core::{ClientConfig, Dag};
//!
//! let client = GridClient::connect(ClientConfig::local())?;
//! let job = client.job("wordcount")?;
//! job.add_archive("./tokenizer.zip", None)?;
//! job.init(None).await?;
//! job.submit(Dag::new(serde_json::json!({ "vertices": [] })).referencing("tokenizer.zip")).await?;
//! let outcome = job.execute().await?.await?;
//! println!("{outcome:?}");
//! job.destroy().await?;
//! # Ok(())
//! # }
//! ```

pub mod bundle;
pub mod client;
pub mod control;
pub mod future;
pub mod job;
pub mod pool;

pub use bundle::ResourceBundle;
pub use client::GridClient;
pub use control::JobControlService;
pub use future::JobFuture;
pub use job::JobHandle;
pub use pool::WorkerPool;
