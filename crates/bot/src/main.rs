// Operator chat bot: edits the monitor's rule file from a single authorized
// Telegram chat.
mod application;
mod handlers;
mod state;


use std::io;

#[tokio::main]
async fn main() -> io::Result<()> {
    if let Err(err) = application::run().await {
        eprintln!("[bot] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}
