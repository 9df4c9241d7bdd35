//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! # Architecture
//!
//! Each command handler:
//! 1. Validates command-specific arguments
//! 2. Calls the backend to perform the operation
//! 3. Formats and displays output
//!
//! Configuration resolution and backend construction happen once, here in
//! `dispatch`, before any handler runs. A config problem (unknown project,
//! bad credentials combination) therefore always fails before a single
//! network request is made.

mod checks;
mod patches;
mod projects;

pub use checks::{check_create, check_list};
pub use patches::{apply, get, git_am, info, list, update, view};
pub use projects::projects;

use anyhow::Result;

use crate::backend::{create_backend, Backend, Credentials};
use crate::cli::args::{Cli, Command};
use crate::config::{Config, ProjectConfig};
use crate::ui::{self, Verbosity};

/// Everything a handler needs besides its own arguments.
pub struct AppContext {
    pub config: Config,
    pub project: ProjectConfig,
    pub verbosity: Verbosity,
}

/// Dispatch a parsed command line to its handler.
pub async fn dispatch(cli: Cli) -> Result<()> {
    let verbosity = Verbosity::from_flags(cli.quiet, cli.debug);

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    ui::debug(format!("loading config from {}", path.display()), verbosity);
    let config = Config::load(&path)?;
    if config.was_upgraded() {
        ui::warn(
            "config uses the legacy single-project format; \
             run with a current-format ~/.pwclientrc to silence this",
            verbosity,
        );
    }

    let project = config.resolve(cli.project.as_deref())?.clone();
    ui::debug(
        format!("project '{}' at {}", project.name, project.url),
        verbosity,
    );

    let credentials = Credentials {
        username: project.username.clone(),
        password: project.password.clone(),
        token: project.token.clone(),
    };
    let backend: Box<dyn Backend> = create_backend(&project.url, project.backend, &credentials)?;
    ui::debug(format!("using {} backend", backend.name()), verbosity);

    let ctx = AppContext {
        config,
        project,
        verbosity,
    };

    match cli.command {
        Command::List {
            name,
            state,
            submitter,
            delegate,
            archived,
            msgid,
            since,
            limit,
            format,
        } => {
            list(
                backend.as_ref(),
                &ctx,
                patches::ListArgs {
                    name,
                    state,
                    submitter,
                    delegate,
                    archived,
                    msgid,
                    since,
                    limit,
                    format,
                },
            )
            .await
        }
        Command::Info { id } => info(backend.as_ref(), id).await,
        Command::Get { id } => get(backend.as_ref(), &ctx, id).await,
        Command::View { ids } => view(backend.as_ref(), &ids).await,
        Command::Apply { ids } => apply(backend.as_ref(), &ctx, &ids).await,
        Command::GitAm {
            ids,
            signoff,
            three_way,
            msgid,
        } => git_am(backend.as_ref(), &ctx, &ids, signoff, three_way, msgid).await,
        Command::Update {
            ids,
            state,
            archived,
            commit_ref,
            delegate,
        } => {
            update(
                backend.as_ref(),
                &ctx,
                &ids,
                state,
                archived,
                commit_ref,
                delegate,
            )
            .await
        }
        Command::Projects => projects(backend.as_ref()).await,
        Command::CheckList { id } => check_list(backend.as_ref(), id).await,
        Command::CheckCreate {
            id,
            context,
            state,
            target_url,
            description,
        } => check_create(backend.as_ref(), id, context, state, target_url, description).await,
    }
}
