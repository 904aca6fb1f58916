#[tokio::main]
async fn main() {
    if let Err(e) = funnel_backend::run().await {
        eprintln!("funnel-backend: {}", e);
        std::process::exit(1);
    }
}
