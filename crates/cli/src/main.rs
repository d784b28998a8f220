use std::io;
use std::sync::Arc;

use clap::Parser;
use hearth::{MemoryManager, Response, Server};

#[derive(Parser)]
#[command(
    name = "hearth-server",
    about = "Standalone HTTP/1.1 server with per-session memory arenas"
)]
struct Args {
    /// Bind address (IPv4 dotted-quad)
    #[arg(long, short, default_value = "127.0.0.1")]
    address: String,

    /// Listen port
    #[arg(long, short, default_value_t = 8080)]
    port: u16,
}

fn main() {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    let memory = Arc::new(MemoryManager::with_defaults());
    let mut server = Server::new(memory);

    server.register_handler("/", &["GET"], |_, arena| {
        Response::text(arena, 200, "Hello, World!")
    });

    server.register_handler("/api/data", &["GET"], |_, arena| {
        Response::json(
            arena,
            200,
            r#"{"status": "success", "message": "Data retrieved successfully"}"#,
        )
    });

    if let Err(e) = server.start(&args.address, args.port) {
        eprintln!("Failed to start server: {e}");
        return;
    }

    println!(
        "Server running on {}:{} — press Enter to stop",
        args.address, args.port
    );
    let mut input = String::new();
    let _ = io::stdin().read_line(&mut input);

    server.stop();
}
