// Panic isolation for collaborator calls
use tokio::task::JoinError;
use tracing::error;

/// Turn a failed join of the fetch/analyze task into a readable message
///
/// A panic inside a collaborator must end the job as `failed`, not kill the
/// worker. The panic payload is recovered when it is a string.
pub fn describe_join_error(err: JoinError) -> String {
    if err.is_cancelled() {
        error!("Analysis task cancelled");
        return "analysis task cancelled".to_string();
    }

    let panic_info = err.into_panic();
    let panic_msg = if let Some(s) = panic_info.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic_info.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    };

    error!(panic_msg = %panic_msg, "Analysis task panicked");
    format!("analysis task panicked: {}", panic_msg)
}
