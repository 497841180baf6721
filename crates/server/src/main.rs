use clap::Parser;
use pwmcp_server::cli::Cli;
use pwmcp_server::logging::init_logging;
use pwmcp_server::resources::ResourceStore;
use pwmcp_server::router::SessionRouter;
use pwmcp_server::uploads::UploadStore;

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	init_logging(cli.verbose);
	let config = cli.config();

	let result = match config.port {
		Some(_) => {
			let router = SessionRouter::new(
				ResourceStore::new(),
				UploadStore::new(),
				config.browser.clone(),
			);
			router.configure(&config).await;
			pwmcp_server::http::serve(config, router).await
		}
		None => pwmcp_server::stdio::run(config).await,
	};

	if let Err(err) = result {
		eprintln!("pwmcp: {err}");
		std::process::exit(1);
	}
}
