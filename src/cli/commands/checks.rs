//! Check commands: check-list, check-create.

use anyhow::{bail, Result};

use crate::backend::{Backend, CheckRequest, CheckState};
use crate::ui;

pub async fn check_list(backend: &dyn Backend, id: u64) -> Result<()> {
    let checks = backend.list_checks(id).await?;
    println!(
        "{:<7} {:<8} {:<24} {} {}",
        "ID", "State", "Context", "Description", "URL"
    );
    for check in checks {
        println!("{}", ui::check_row(&check));
    }
    Ok(())
}

pub async fn check_create(
    backend: &dyn Backend,
    id: u64,
    context: String,
    state: String,
    target_url: Option<String>,
    description: String,
) -> Result<()> {
    let Some(state) = CheckState::parse(&state) else {
        bail!("unknown check state '{state}'; expected pending, success, warning, or fail");
    };

    let check = backend
        .create_check(
            id,
            CheckRequest {
                context,
                state,
                description,
                target_url,
            },
        )
        .await?;
    println!(
        "Created check '{}' ({}) for patch #{}",
        check.context, check.state, id
    );
    Ok(())
}
