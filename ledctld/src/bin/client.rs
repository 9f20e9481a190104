use std::path::PathBuf;

use clap::Parser;
use futures::{SinkExt, TryStreamExt};
use ledctld::*;

/// Send one action to ledctld
#[derive(Debug, Parser)]
struct Args {
    #[clap(long, default_value = DEFAULT_SOCKET)]
    socket: PathBuf,

    #[clap(subcommand)]
    action: Action,
}

async fn request(args: Args) -> std::io::Result<Reply> {
    let stream = tokio::net::UnixStream::connect(&args.socket).await?;
    let mut payloads = client_transport(stream);

    payloads
        .send(SocketPayload {
            action: args.action,
        })
        .await?;

    payloads.try_next().await?.ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "ledctld closed the connection",
        )
    })
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    let socket = args.socket.clone();

    match request(args).await {
        Ok(Reply::Done) => {}
        Ok(Reply::Status(report)) => print!("{}", report),
        Ok(Reply::Error(message)) => {
            eprintln!("error: {}", message);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("can't talk to ledctld at {}: {}", socket.display(), e);
            std::process::exit(2);
        }
    }
}
