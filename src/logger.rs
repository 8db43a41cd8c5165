use crate::peer::ice::candidate_type;
use crate::peer::types::IceCandidate;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

/// Формат временных меток в логе
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Логирование с временными метками.
///
/// `RUST_LOG` имеет приоритет над `filter`. Повторный вызов ничего не делает.
pub fn init_logging(filter: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
        .with_target(false)
        .try_init();
}

/// Строка для лога по trickle-кандидату
pub fn describe_candidate(cand: &IceCandidate) -> String {
    format!(
        "type={} candidate={} sdp_mid={:?} sdp_mline_index={:?}",
        candidate_type(cand).unwrap_or("unknown"),
        cand.candidate,
        cand.sdp_mid,
        cand.sdp_mline_index
    )
}
