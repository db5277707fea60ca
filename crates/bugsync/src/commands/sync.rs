//! `sync` and `watch` handlers.

use std::sync::Arc;

use bugsync_core::Bug;
use tracing::{debug, info};

use super::{Engine, refresh};
use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output::{self, BugRow};

pub async fn sync(engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    if global.offline {
        return Err(CliError::Offline {
            operation: "sync".into(),
        });
    }

    let report = engine.drain().await?;
    let out = output::render_single(
        &global.output,
        &report,
        output::drain_detail,
        |r| {
            format!(
                "synced={} removed={} failed={} skipped={}",
                r.synced, r.removed, r.failed, r.skipped
            )
        },
    )?;
    output::print_output(&out, global.quiet);

    if report.is_complete() {
        Ok(())
    } else {
        if let Some(error) = engine.state().sync_error {
            output::print_note(&format!("Last failure: {error}"), global.quiet);
        }
        Err(CliError::SyncIncomplete {
            failed: report.failed,
        })
    }
}

/// Print the collection, then reprint it on every change until Ctrl-C.
///
/// Reporting the connection as up makes the engine replay anything queued.
pub async fn watch(engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    refresh(engine, global).await?;
    engine.set_connected(!global.offline);

    let color = output::should_color(&global.color);
    let render = |bugs: &[Arc<Bug>]| {
        output::render_list(
            &global.output,
            bugs,
            |b| BugRow::new(b, color),
            |b| output::bug_id(b),
        )
    };

    let mut stream = engine.subscribe();
    let mut shown = stream.current().visible();
    output::print_output(&render(&shown)?, global.quiet);
    info!(bugs = shown.len(), "watching for changes");

    loop {
        tokio::select! {
            biased;

            _ = tokio::signal::ctrl_c() => {
                debug!("interrupted");
                break;
            }

            state = stream.changed() => {
                let Some(state) = state else { break };
                let visible = state.visible();
                if visible != shown {
                    output::print_output(&render(&visible)?, global.quiet);
                    shown = visible;
                }
            }
        }
    }
    Ok(())
}
