use melodeck::{MelodeckApp, Settings, spawn_engine};
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("melodeck=info")),
        )
        .init();

    let settings = match Settings::load_or_default() {
        Ok(settings) => settings,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    info!(api_url = settings.api_url, "starting melodeck");

    let engine = match spawn_engine(settings) {
        Ok(engine) => engine,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([720.0, 800.0])
            .with_title("Melodeck"),
        ..Default::default()
    };

    if let Err(e) = eframe::run_native(
        "Melodeck",
        options,
        Box::new(|_cc| Ok(Box::new(MelodeckApp::new(engine)))),
    ) {
        error!("{}", e);
    }
}
