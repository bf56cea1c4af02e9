use ctor::ctor;
use tracing::Level;

// Installs a tracing subscriber at load time when DEBUG_MTREE is set to anything other
// than "0" or "false".
#[ctor]
fn init_tracing() {
    let enabled = std::env::var("DEBUG_MTREE")
        .map_or(false, |v| !(v.is_empty() || v == "0" || v == "false"));
    if enabled {
        tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .init();
    }
}
