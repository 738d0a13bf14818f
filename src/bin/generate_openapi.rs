//! Renders the AquaSense OpenAPI document.
//!
//!   generate_openapi                    print to stdout
//!   generate_openapi --output FILE      write FILE
//!   generate_openapi --check FILE       fail if FILE is out of date

use std::{fs, io::Write, path::PathBuf};

use anyhow::{bail, Context, Result};
use aquasense_service::api::handlers::ApiDoc;
use utoipa::OpenApi;

#[derive(Debug, PartialEq)]
enum Target {
    Stdout,
    Write(PathBuf),
    Check(PathBuf),
}

fn parse_args(args: &[String]) -> Result<Target> {
    match args {
        [] => Ok(Target::Stdout),
        [flag, path] if flag == "--output" => Ok(Target::Write(path.into())),
        [flag, path] if flag == "--check" => Ok(Target::Check(path.into())),
        _ => bail!("usage: generate_openapi [--output FILE | --check FILE]"),
    }
}

fn render() -> Result<String> {
    let doc = ApiDoc::openapi();
    for (path, _) in doc.paths.paths.iter() {
        eprintln!("  {path}");
    }
    let mut json = doc.to_pretty_json().context("Failed to serialise OpenAPI document")?;
    json.push('\n');
    Ok(json)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let target = parse_args(&args)?;
    let json = render()?;

    match target {
        Target::Stdout => std::io::stdout()
            .write_all(json.as_bytes())
            .context("Failed to write OpenAPI document to stdout")?,
        Target::Write(path) => {
            fs::write(&path, &json).with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("OpenAPI document written to {}", path.display());
        }
        Target::Check(path) => {
            let current = fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
            if current != json {
                bail!("{} is out of date; regenerate with --output", path.display());
            }
            eprintln!("{} is up to date", path.display());
        }
    }
    Ok(())
}
