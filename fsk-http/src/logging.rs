use owo_colors::OwoColorize;
use std::sync::OnceLock;
use supports_color::Stream;
use tracing_subscriber::EnvFilter;

static ANSI_ENABLED: OnceLock<bool> = OnceLock::new();

/// Installs the global subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init(default_filter: &str) -> Result<(), Box<dyn std::error::Error>> {
    let ansi = *ANSI_ENABLED.get_or_init(detect_ansi);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(ansi)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .try_init()
        .map_err(|err| std::io::Error::other(err.to_string()))?;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum Category {
    Access,
    Encode,
    Decode,
    Reaper,
    Health,
}

impl Category {
    fn label(self) -> &'static str {
        match self {
            Category::Access => "ACCESS",
            Category::Encode => "ENCODE",
            Category::Decode => "DECODE",
            Category::Reaper => "REAPER",
            Category::Health => "HEALTH",
        }
    }

    fn render(self) -> String {
        let label = self.label();
        if !ansi_enabled() {
            return label.to_string();
        }
        match self {
            Category::Access => format!("{}", label.bright_cyan().bold()),
            Category::Encode => format!("{}", label.bright_green().bold()),
            Category::Decode => format!("{}", label.bright_blue().bold()),
            Category::Reaper => format!("{}", label.bright_magenta().bold()),
            Category::Health => format!("{}", label.bright_yellow().bold()),
        }
    }
}

pub fn category_access() -> String {
    Category::Access.render()
}

pub fn category_encode() -> String {
    Category::Encode.render()
}

pub fn category_decode() -> String {
    Category::Decode.render()
}

pub fn category_reaper() -> String {
    Category::Reaper.render()
}

pub fn category_health() -> String {
    Category::Health.render()
}

pub fn method_label(method: &str) -> String {
    if !ansi_enabled() {
        return method.to_string();
    }

    match method {
        "GET" => format!("{}", method.bright_blue()),
        "POST" => format!("{}", method.bright_green()),
        _ => format!("{}", method.bright_white()),
    }
}

pub fn status_label(status: u16) -> String {
    let text = status.to_string();
    if !ansi_enabled() {
        return text;
    }

    match status {
        200..=299 => format!("{}", text.bright_green()),
        400..=499 => format!("{}", text.bright_yellow()),
        503 | 504 => format!("{}", text.yellow()),
        _ => format!("{}", text.bright_red()),
    }
}

fn ansi_enabled() -> bool {
    *ANSI_ENABLED.get_or_init(detect_ansi)
}

fn detect_ansi() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }

    if std::env::var_os("FORCE_COLOR").is_some() {
        let _ = enable_ansi_support();
        return true;
    }

    let windows_vt = enable_ansi_support().is_ok();
    windows_vt || supports_color::on_cached(Stream::Stdout).is_some()
}

#[cfg(windows)]
fn enable_ansi_support() -> windows::core::Result<()> {
    use windows::Win32::System::Console::{
        CONSOLE_MODE, ENABLE_VIRTUAL_TERMINAL_PROCESSING, GetConsoleMode, GetStdHandle,
        STD_OUTPUT_HANDLE, SetConsoleMode,
    };

    unsafe {
        let handle = GetStdHandle(STD_OUTPUT_HANDLE)?;
        let mut mode = CONSOLE_MODE::default();
        GetConsoleMode(handle, &mut mode)?;
        SetConsoleMode(handle, mode | ENABLE_VIRTUAL_TERMINAL_PROCESSING)?;
    }
    Ok(())
}

#[cfg(not(windows))]
fn enable_ansi_support() -> Result<(), ()> {
    Err(())
}
