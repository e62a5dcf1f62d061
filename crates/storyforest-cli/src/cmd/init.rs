use anyhow::Context;
use std::path::Path;
use storyforest_core::{config::Config, io, paths};

pub fn run(root: &Path, name: Option<&str>) -> anyhow::Result<()> {
    let project_name = name.map(str::to_string).unwrap_or_else(|| {
        root.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    });

    println!("Initializing story forest in: {}", root.display());

    let dir = paths::storyforest_dir(root);
    io::ensure_dir(&dir).with_context(|| format!("failed to create {}", dir.display()))?;

    if paths::config_path(root).exists() {
        println!("  exists:  {}", paths::CONFIG_FILE);
    } else {
        Config::new(&project_name)
            .save(root)
            .context("failed to write config.yaml")?;
        println!("  created: {}", paths::CONFIG_FILE);
    }

    // An empty forest file loads as version 0.
    let created = io::write_if_missing(&paths::forest_path(root), b"")
        .context("failed to create forest.yaml")?;
    let verb = if created { "created:" } else { "exists: " };
    println!("  {verb} {}", paths::FOREST_FILE);

    println!("\nstory forest initialized. Next: storyforest mr create <title> --branch <branch>");
    Ok(())
}
