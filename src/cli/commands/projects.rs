//! Project listing.

use anyhow::Result;

use crate::backend::Backend;
use crate::ui;

pub async fn projects(backend: &dyn Backend) -> Result<()> {
    let projects = backend.list_projects().await?;
    println!("{}", ui::project_table_header());
    for project in projects {
        println!("{}", ui::project_table_row(&project));
    }
    Ok(())
}
