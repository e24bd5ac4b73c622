use std::io::Write;

use env_logger::Builder;
use once_cell::sync::OnceCell;

static INIT: OnceCell<()> = OnceCell::new();

/// Installs the env_logger backend, once per process. Tests across many
/// modules all call this in their setup; `env_logger`'s own `init()`
/// panics on a second call, so the guard matters here.
pub fn init_log() {
    INIT.get_or_init(|| {
        let mut builder = Builder::from_default_env();
        builder
            .format_timestamp_secs()
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} - {}] [{}:{}] {}",
                    record.level(),
                    record.target(),
                    record.file().unwrap(),
                    record.line().unwrap(),
                    record.args()
                )
            })
            .init();
    });
}
