//! Serve one or more mountpoints over plain HTTP with hyper.
//!
//! cargo run --example hyper -- -m /=/srv/dav -m /pub=/srv/pub

use std::net::SocketAddr;

use clap::Parser;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use dav_mount::{DavHandler, MemCache, Mountpoint};

#[derive(Parser)]
struct Args {
    /// Mountpoint as prefix=directory (repeatable).
    #[arg(short, long = "mountpoint", required = true)]
    mountpoints: Vec<String>,
    /// Stylesheet URL for the directory index (repeatable).
    #[arg(long = "css")]
    css: Vec<String>,
    /// Script URL for the directory index (repeatable).
    #[arg(long = "javascript")]
    javascript: Vec<String>,
    /// id of the element wrapping the directory index.
    #[arg(long)]
    div: Option<String>,
    /// CSS class for directory entries in the index.
    #[arg(long = "class-directory")]
    class_directory: Option<String>,
    /// Port to listen on.
    #[arg(short, long, default_value = "4918")]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = DavHandler::builder()
        .stylesheets(args.css)
        .scripts(args.javascript)
        .lock_cache(MemCache::new());
    if let Some(div) = args.div {
        config = config.indexer_id(div);
    }
    if let Some(class) = args.class_directory {
        config = config.indexer_class(class);
    }
    for mp in &args.mountpoints {
        let (prefix, dir) = mp
            .split_once('=')
            .ok_or("mountpoint must be prefix=directory")?;
        println!("serving {} on {}", dir, prefix);
        config = config.mountpoint(Mountpoint::new(prefix, dir)?);
    }
    let dav = config.build_handler();

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));
    let listener = TcpListener::bind(addr).await?;
    println!("listening on http://{}", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let dav = dav.clone();
        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let dav = dav.clone();
                async move { dav.handle(req).await }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                eprintln!("connection error: {}", e);
            }
        });
    }
}
