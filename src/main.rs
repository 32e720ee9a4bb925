mod body;
mod cert;
mod config;
mod err;
mod http;
mod opt;
mod routes;
mod serve;
mod shutdown;
mod tcp;
mod tls;

#[tokio::main]
async fn main() -> Result<(), err::DisplayError> {
    let options: opt::Options = clap::Parser::parse();

    env_logger::Builder::new()
        .filter_level(match options.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        })
        .init();

    let config = config::Config::from_options(&options)?;
    serve::main(config).await?;

    Ok(())
}
