use anyhow::Result;
use std::path::Path;

use larder_core::service::RecipeService;

pub(crate) fn cmd_export(svc: &RecipeService, file: &Path, json: bool) -> Result<()> {
    let count = svc.export_json(file)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "exported": count, "file": file.display().to_string() })
        );
    } else {
        println!(
            "Exported {count} recipe(s) from the {} store to {}",
            svc.backend(),
            file.display()
        );
    }
    Ok(())
}

pub(crate) fn cmd_import(svc: &RecipeService, file: &Path, json: bool) -> Result<()> {
    let count = svc.import_json(file)?;
    if json {
        println!(
            "{}",
            serde_json::json!({ "imported": count, "file": file.display().to_string() })
        );
    } else {
        println!(
            "Imported {count} recipe(s) into the {} store from {}",
            svc.backend(),
            file.display()
        );
    }
    Ok(())
}
