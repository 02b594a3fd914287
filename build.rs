// ABOUTME: Build script for compile-time feature validation
// ABOUTME: Warns when no integrations are enabled and the bot would only log messages

fn main() {
    let has_tfs = std::env::var_os("CARGO_FEATURE_TFS").is_some();

    if !has_tfs {
        println!(
            "cargo::warning=No integration features enabled. \
             The bot will connect but has no sinks or feeds. Enable: tfs"
        );
    }
}
