#![allow(dead_code)]

use std::{
    fs,
    net::SocketAddr,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use fskhttp::{ServiceConfig, SharedState, build_app, is_artifact_name};
use tokio::task::JoinHandle;

static SCRATCH_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Writes `RIFF<text>` to the `-f<path>` target, or to stdout without one.
pub const ENCODER: &str = r#"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    -f*) out="${arg#-f}" ;;
  esac
done
text=$(cat)
if [ -n "$out" ]; then
  printf 'RIFF%s' "$text" > "$out"
else
  printf 'RIFF%s' "$text"
fi
"#;

/// Ignores the file argument and only ever writes to stdout.
pub const STDOUT_ONLY_ENCODER: &str = r#"#!/bin/sh
text=$(cat)
printf 'RIFF%s' "$text"
"#;

pub const GARBAGE_ENCODER: &str = r#"#!/bin/sh
cat > /dev/null
printf 'not audio'
"#;

pub const SLOW_ENCODER: &str = r#"#!/bin/sh
sleep 1
out=""
for arg in "$@"; do
  case "$arg" in
    -f*) out="${arg#-f}" ;;
  esac
done
text=$(cat)
printf 'RIFF%s' "$text" > "$out"
"#;

/// Reverses ENCODER and reports in the real decoder's line format.
pub const DECODER: &str = r#"#!/bin/sh
data=$(cat "$1")
text=${data#RIFF}
printf '[+] Number of channels: 1\n'
printf '[+] Sample rate: 48000\n'
printf '[+] Bits per sample: 16\n'
printf '[+] Total samples: 1024\n'
printf "[+] Decoded message with length %s: '%s'\n" "${#text}" "$text"
printf '[+] Done\n'
"#;

pub const INCOMPLETE_DECODER: &str = r#"#!/bin/sh
printf "[+] Decoded message with length 5: 'hello'\n"
"#;

pub const FAILING_DECODER: &str = r#"#!/bin/sh
echo "unsupported sample format" >&2
echo "partial output"
exit 2
"#;

pub const HANGING: &str = r#"#!/bin/sh
sleep 30
"#;

pub struct Gateway {
    pub addr: SocketAddr,
    pub handle: JoinHandle<()>,
    pub state: SharedState,
    pub root: PathBuf,
}

impl Gateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.root.join("artifacts")
    }

    pub fn leftover_artifacts(&self) -> Vec<PathBuf> {
        list_artifacts(&self.artifact_dir())
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.handle.abort();
        let _ = fs::remove_dir_all(&self.root);
    }
}

pub fn scratch_root(test_name: &str) -> PathBuf {
    let seq = SCRATCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0);
    let root = std::env::temp_dir().join(format!("fsk-http-{test_name}-{now}-{seq}"));
    fs::create_dir_all(root.join("artifacts")).expect("scratch dirs should be created");
    root
}

pub fn write_script(root: &Path, name: &str, body: &str) -> PathBuf {
    let path = root.join(name);
    fs::write(&path, body).expect("script should be written");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .expect("script should be executable");
    path
}

pub fn list_artifacts(dir: &Path) -> Vec<PathBuf> {
    fs::read_dir(dir)
        .map(|entries| {
            entries
                .flatten()
                .filter(|entry| {
                    entry
                        .file_name()
                        .to_str()
                        .map(is_artifact_name)
                        .unwrap_or(false)
                })
                .map(|entry| entry.path())
                .collect()
        })
        .unwrap_or_default()
}

pub struct GatewayOptions<'a> {
    pub encoder: &'a str,
    pub decoder: &'a str,
    pub max_concurrent_requests: usize,
    pub request_timeout: Duration,
    pub health_check_enabled: bool,
}

impl Default for GatewayOptions<'_> {
    fn default() -> Self {
        Self {
            encoder: ENCODER,
            decoder: DECODER,
            max_concurrent_requests: 8,
            request_timeout: Duration::from_secs(10),
            health_check_enabled: true,
        }
    }
}

pub async fn spawn_gateway(test_name: &str, options: GatewayOptions<'_>) -> Gateway {
    let root = scratch_root(test_name);
    let config = ServiceConfig {
        max_concurrent_requests: options.max_concurrent_requests,
        request_timeout: options.request_timeout,
        to_file_binary: write_script(&root, "fake-to-file", options.encoder),
        from_file_binary: write_script(&root, "fake-from-file", options.decoder),
        health_check_enabled: options.health_check_enabled,
        temp_dir: root.join("artifacts"),
        ..ServiceConfig::default()
    };
    spawn_with_config(root, config).await
}

pub async fn spawn_with_config(root: PathBuf, config: ServiceConfig) -> Gateway {
    let state = SharedState::new(config);
    let app = build_app(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have addr");
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server should run");
    });
    Gateway {
        addr,
        handle,
        state,
        root,
    }
}

pub fn wav_part(bytes: Vec<u8>, filename: &str) -> reqwest::multipart::Form {
    reqwest::multipart::Form::new().part(
        "file",
        reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string()),
    )
}
