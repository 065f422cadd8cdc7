use clap::Parser;
use dip_client::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();
    if let Err(e) = dip_client::run(args).await {
        eprintln!("dip-client: {}", e);
        std::process::exit(1);
    }
}
