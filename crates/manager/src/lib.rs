//! Reconcile an organization document into PagerDuty.
//!
//! The document lists teams with their members, services and on-call
//! settings. A run looks every entity up by its natural key (team name, user
//! email, schedule/policy/service name) and creates whatever is missing, in
//! dependency order:
//!
//! 1. teams
//! 2. users, then team memberships
//! 3. one on-call schedule per team (`<team> On-call`)
//! 4. one escalation policy per team (`<team> Escalation`)
//! 5. services, plus an `oncall-<slack>` alias service per team
//!
//! Nothing is updated or deleted, so running twice against an unchanged
//! account makes no writes the second time.
//!
//! # Usage
//!
//! ```no_run
//! use pd_manager::{reconcile_file, ReconcileOptions};
//! use pagerduty::ApiConfig;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), pd_manager::ReconcileError> {
//! let outcome = reconcile_file(
//!     "org.json".as_ref(),
//!     &ApiConfig::from_env(),
//!     ReconcileOptions::default(),
//!     CancellationToken::new(),
//! )
//! .await?;
//! println!("created {}", outcome.report.created_total());
//! # Ok(())
//! # }
//! ```

#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use pagerduty::{ApiClient, ApiConfig, Platform, RoleMapping};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod config;
pub mod descriptors;
pub mod error;
pub mod index;
pub mod reconcile;
pub mod report;
pub mod state;

pub use config::{ConfigError, OrganizationConfig, ValidatedConfig};
pub use error::ReconcileError;
pub use index::{IdSnapshot, ResolvedIds};
pub use reconcile::{ReconcileOptions, Reconciler, Reconciliation, DEFAULT_CONCURRENCY};
pub use report::{PhaseReport, ReconcileReport, Resolution};
pub use state::{Phase, State};

/// Default end-to-end deadline for a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Load, validate and reconcile the document at `path`.
///
/// The document is fully validated before a client is built, so a bad
/// document never reaches the network.
pub async fn reconcile_file(
    path: &Path,
    api: &ApiConfig,
    options: ReconcileOptions,
    cancel: CancellationToken,
) -> Result<Reconciliation, ReconcileError> {
    let roles = Arc::new(RoleMapping::standard());
    let config = OrganizationConfig::load(path)?.validate(&roles)?;
    info!(
        path = %path.display(),
        teams = config.teams().len(),
        "Loaded organization document"
    );

    let client = ApiClient::with_cancellation(api, cancel).map_err(ReconcileError::Client)?;
    let platform = Platform::new(&client, Arc::clone(&roles));

    Reconciler::new(config, platform, roles, options).run().await
}

/// Cancel `cancel` once `after` has elapsed.
///
/// The task ends early if the token is cancelled by someone else.
pub fn spawn_deadline(cancel: CancellationToken, after: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(after) => {
                warn!(timeout_secs = after.as_secs(), "Run deadline reached, cancelling requests");
                cancel.cancel();
            }
            () = cancel.cancelled() => {}
        }
    })
}
