use anyhow::Result;
use colored::Colorize;
use localhist_server::HistoryServer;
use std::path::PathBuf;

pub async fn run(path: PathBuf, port: u16) -> Result<()> {
    let abs_path = std::fs::canonicalize(&path)?;

    println!("{}", "🚀 Starting localhist server...".bold().cyan());
    println!("   {}: {:?}", "Watching".bold(), abs_path);

    let server = HistoryServer::new(&abs_path)?;

    println!(
        "   {}: {:?}",
        "History".bold(),
        server.engine().workspace().history_path()
    );
    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://localhost:{}", port).green()
    );
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let addr = format!("0.0.0.0:{}", port).parse()?;
    server.serve(addr).await?;

    Ok(())
}
