//! Bug command handlers.

use std::sync::Arc;

use serde::Serialize;

use bugsync_core::{Bug, BugId, DeleteOutcome, SaveOutcome};

use super::{Engine, refresh};
use crate::cli::{DeleteArgs, GlobalOpts, SaveArgs, ShowArgs};
use crate::error::CliError;
use crate::output::{self, BugRow};

fn render_bugs(bugs: &[Arc<Bug>], global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        bugs,
        |b| BugRow::new(b, color),
        |b| output::bug_id(b),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn render_bug(bug: &Bug, global: &GlobalOpts) -> Result<(), CliError> {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        bug,
        |b| output::bug_detail(b, color),
        output::bug_id,
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

fn lookup(engine: &Engine, id: &str) -> Result<Arc<Bug>, CliError> {
    engine
        .get(&BugId::from(id))
        .filter(|b| b.is_visible())
        .ok_or_else(|| CliError::NotFound { id: id.to_owned() })
}

// ── Handlers ─────────────────────────────────────────────────────────

pub async fn list(engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    refresh(engine, global).await?;
    render_bugs(&engine.visible(), global)
}

pub async fn show(engine: &Engine, args: ShowArgs, global: &GlobalOpts) -> Result<(), CliError> {
    refresh(engine, global).await?;
    let bug = lookup(engine, &args.id)?;
    render_bug(&bug, global)
}

pub fn pending(engine: &Engine, global: &GlobalOpts) -> Result<(), CliError> {
    render_bugs(&engine.pending(), global)
}

pub async fn save(engine: &Engine, args: SaveArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let mut bug = match args.id {
        Some(ref id) => {
            refresh(engine, global).await?;
            Bug::clone(&*lookup(engine, id)?)
        }
        None => {
            let title = args.title.clone().ok_or_else(|| CliError::Validation {
                field: "title".into(),
                reason: "required when creating a bug".into(),
            })?;
            Bug::new(title, "", 0)
        }
    };

    if let Some(title) = args.title {
        bug.title = title;
    }
    if let Some(description) = args.description {
        bug.description = description;
    }
    if let Some(priority) = args.priority {
        bug.priority = priority;
    }
    if let Some(photo) = args.photo {
        bug.photo_path = photo;
    }
    if let (Some(latitude), Some(longitude)) = (args.latitude, args.longitude) {
        bug = bug.with_location(latitude, longitude);
    }

    match engine.save(bug, !global.offline).await? {
        SaveOutcome::Synced(saved) => render_bug(&saved, global),
        SaveOutcome::Pending(queued) => {
            output::print_note(
                &format!(
                    "Server unreachable, change queued as {}. Run `bugsync sync` to retry.",
                    output::bug_id(&queued)
                ),
                global.quiet,
            );
            render_bug(&queued, global)
        }
    }
}

#[derive(Serialize)]
struct DeleteResult {
    id: String,
    queued: bool,
}

pub async fn delete(engine: &Engine, args: DeleteArgs, global: &GlobalOpts) -> Result<(), CliError> {
    refresh(engine, global).await?;
    let bug = lookup(engine, &args.id)?;

    let queued = match engine.delete(&bug, !global.offline).await? {
        DeleteOutcome::Removed => false,
        DeleteOutcome::Pending => {
            output::print_note(
                &format!(
                    "Server unreachable, delete of {} queued. Run `bugsync sync` to retry.",
                    args.id
                ),
                global.quiet,
            );
            true
        }
    };

    let result = DeleteResult {
        id: args.id,
        queued,
    };
    let out = output::render_single(
        &global.output,
        &result,
        |r| {
            if r.queued {
                format!("Queued delete of {}", r.id)
            } else {
                format!("Deleted {}", r.id)
            }
        },
        |r| r.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
