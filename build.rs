use clap::CommandFactory;
use std::fs;
use std::path::PathBuf;

include!("src/cli.rs");

fn main() -> std::io::Result<()> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_dir = std::env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| std::io::Error::other("OUT_DIR not set"))?;
    let man_dir = out_dir.join("../../../man");

    fs::create_dir_all(&man_dir)?;

    let cmd = Cli::command();
    let date = chrono::Utc::now().format("%Y-%m-%d").to_string();
    let man = clap_mangen::Man::new(cmd).date(date);
    let mut buffer = Vec::new();
    man.render(&mut buffer)?;

    let page = man_dir.join("otf2-convert.1");
    fs::write(&page, buffer)?;

    println!("cargo:warning=Man page generated at {:?}", page);

    Ok(())
}
