use anyhow::Result;
use reconcile::normalize_lists;

use crate::Context;
use crate::cli::SnapshotArgs;
use crate::config::load_want;
use crate::resource;
use crate::ui;

pub fn run(ctx: &Context, args: SnapshotArgs) -> Result<()> {
    let schema = resource::find(&args.resource)?;
    let store = ctx.store()?;

    if let Some(from) = &args.from {
        let tree = load_want(from)?;
        schema.validate(&tree)?;
        let tree = normalize_lists(&tree, schema.key_spec());
        let path = store.save(schema.name(), &tree, "import")?;
        ui::success(&format!(
            "Recorded {} snapshot at {}",
            schema.name(),
            path.display()
        ));
        return Ok(());
    }

    match store.load(schema.name())? {
        Some(snapshot) => {
            if !ctx.quiet {
                ui::header(&snapshot.resource);
                ui::kv("taken", &snapshot.taken_at.to_rfc3339());
                ui::kv("source", &snapshot.source);
                println!();
            }
            println!("{}", serde_json::to_string_pretty(&snapshot.config)?);
        }
        None => ui::info(&format!(
            "No snapshot for {} in {}",
            schema.name(),
            store.dir().display()
        )),
    }
    Ok(())
}
