use log::info;
use quiz_room_server::{
    config::Config,
    error::StartupError,
    loggers::file_logger::init_file_logger,
    models::game::{Pack, QuestionBank},
    server::serve,
    state::ServerState,
};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env()?;
    init_file_logger(&config.log_dir, config.log_level)?;
    info!("App started!");

    let pack = match &config.pack_path {
        Some(path) => Pack::from_file(path)?,
        None => Pack::builtin()?,
    };
    let bank = QuestionBank::from_pack(pack)?;
    info!(
        "Question bank {} loaded with {} questions",
        bank.name(),
        bank.question_count()
    );

    let tls = config.tls_acceptor()?;
    let state = ServerState::new(bank, config.room_settings(), config.pin_length);
    let listener = TcpListener::bind(&config.addr).await?;

    tokio::select! {
        result = serve(listener, state.clone(), tls) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    state.registry.shutdown();
    info!("App stopped");
    Ok(())
}
