//! Patch commands: list, info, get, view, apply, git-am, update.

use std::io::Write as _;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{bail, Context as _, Result};

use super::AppContext;
use crate::apply::{Applier, ApplyOptions};
use crate::backend::{Backend, ListFilter, PatchUpdate};
use crate::config::parse_bool;
use crate::ui;

/// Arguments for the list command, mirroring its CLI flags.
pub struct ListArgs {
    pub name: Option<String>,
    pub state: Option<String>,
    pub submitter: Option<String>,
    pub delegate: Option<String>,
    pub archived: Option<String>,
    pub msgid: Option<String>,
    pub since: Option<String>,
    pub limit: Option<usize>,
    pub format: Option<String>,
}

pub async fn list(backend: &dyn Backend, ctx: &AppContext, args: ListArgs) -> Result<()> {
    let archived = args
        .archived
        .map(|value| parse_bool(&value).map_err(anyhow::Error::msg))
        .transpose()
        .context("invalid --archived value")?;

    let filter = ListFilter {
        project: Some(ctx.project.name.clone()),
        state: args.state,
        submitter: args.submitter,
        delegate: args.delegate,
        since: args.since,
        archived,
        msgid: args.msgid,
        name: args.name,
        limit: args.limit,
    };

    let mut patches = backend.list_patches(filter).await?;

    if args.format.is_none() {
        println!("{}", ui::patch_table_header());
    }
    while let Some(patch) = patches.try_next().await? {
        match &args.format {
            Some(format) => println!("{}", ui::patch_format(&patch, format)),
            None => println!("{}", ui::patch_table_row(&patch)),
        }
    }
    Ok(())
}

pub async fn info(backend: &dyn Backend, id: u64) -> Result<()> {
    let patch = backend.get_patch(id).await?;
    print!("{}", ui::patch_detail(&patch));
    Ok(())
}

pub async fn get(backend: &dyn Backend, ctx: &AppContext, id: u64) -> Result<()> {
    let patch = backend.get_patch(id).await?;
    let mbox = backend.get_mbox(id).await?;

    let base = if patch.filename.is_empty() {
        id.to_string()
    } else {
        patch.filename.clone()
    };
    let path = unused_path(&base);
    std::fs::write(&path, &mbox)
        .with_context(|| format!("failed to write {}", path.display()))?;
    ui::print(
        format!("Saved patch to {}", path.display()),
        ctx.verbosity,
    );
    Ok(())
}

/// First of `base.mbox`, `base.1.mbox`, `base.2.mbox`, ... that does not
/// already exist.
fn unused_path(base: &str) -> PathBuf {
    let candidate = PathBuf::from(format!("{base}.mbox"));
    if !candidate.exists() {
        return candidate;
    }
    let mut n = 1;
    loop {
        let candidate = PathBuf::from(format!("{base}.{n}.mbox"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

pub async fn view(backend: &dyn Backend, ids: &[u64]) -> Result<()> {
    let mut mboxes = Vec::with_capacity(ids.len());
    for &id in ids {
        mboxes.push(backend.get_mbox(id).await?);
    }
    let combined = mboxes.join(&b'\n');

    match std::env::var("PAGER") {
        Ok(pager) if !pager.is_empty() => {
            let mut parts = pager.split_whitespace();
            let program = parts.next().unwrap_or("less");
            let mut child = Command::new(program)
                .args(parts)
                .stdin(Stdio::piped())
                .spawn()
                .with_context(|| format!("failed to run pager '{pager}'"))?;
            if let Some(mut stdin) = child.stdin.take() {
                // The pager quitting early is not an error.
                let _ = stdin.write_all(&combined);
            }
            child.wait()?;
        }
        _ => {
            std::io::stdout().write_all(&combined)?;
        }
    }
    Ok(())
}

pub async fn apply(backend: &dyn Backend, ctx: &AppContext, ids: &[u64]) -> Result<()> {
    let applier = Applier::custom("patch", &["-p1"]);
    for &id in ids {
        let patch = backend.get_patch(id).await?;
        let mbox = backend.get_mbox(id).await?;
        ui::print(
            format!("Applying patch #{} to current directory", id),
            ctx.verbosity,
        );
        ui::print(format!("Description: {}", patch.name), ctx.verbosity);
        applier.apply(&mbox, &ApplyOptions::default())?;
    }
    Ok(())
}

pub async fn git_am(
    backend: &dyn Backend,
    ctx: &AppContext,
    ids: &[u64],
    signoff: bool,
    three_way: bool,
    msgid: bool,
) -> Result<()> {
    // A flag wins; otherwise per-project overrides, then global options.
    let options = ctx.config.effective_options(&ctx.project);
    let signoff = signoff || options.signoff;
    let three_way = three_way || options.three_way;
    let add_msgid = msgid || options.msgid;

    let applier = Applier::git_am();
    for &id in ids {
        let patch = backend.get_patch(id).await?;
        let mbox = backend.get_mbox(id).await?;
        let apply_options = ApplyOptions {
            signoff,
            three_way,
            add_msgid,
            message_id: Some(patch.msgid.clone()).filter(|m| !m.is_empty()),
        };
        ui::print(
            format!("Applying patch #{} using 'git am'", id),
            ctx.verbosity,
        );
        ui::print(format!("Description: {}", patch.name), ctx.verbosity);
        applier.apply(&mbox, &apply_options)?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn update(
    backend: &dyn Backend,
    ctx: &AppContext,
    ids: &[u64],
    state: Option<String>,
    archived: Option<String>,
    commit_ref: Option<String>,
    delegate: Option<String>,
) -> Result<()> {
    if commit_ref.is_some() && ids.len() > 1 {
        bail!("--commit-ref can only be used with a single patch id");
    }
    if state.is_none() && archived.is_none() {
        bail!("at least one of --state or --archived is required");
    }

    let archived = archived
        .map(|value| parse_bool(&value).map_err(anyhow::Error::msg))
        .transpose()
        .context("invalid --archived value")?;

    for &id in ids {
        let update = PatchUpdate {
            state: state.clone(),
            archived,
            commit_ref: commit_ref.clone(),
            delegate: delegate.clone(),
        };
        let patch = backend.update_patch(id, update).await?;
        ui::print(
            format!("Patch #{} updated: state={}", id, patch.state),
            ctx.verbosity,
        );
    }
    Ok(())
}
