use super::*;

pub(super) async fn encode_handler(State(state): State<SharedState>, request: Request) -> Response {
    let started = Instant::now();
    match encode_text(&state, request).await {
        Ok(audio) => {
            info!(
                "{} produced {} bytes in {:.2}s",
                category_encode(),
                audio.len(),
                started.elapsed().as_secs_f64()
            );
            (
                StatusCode::OK,
                [
                    (CONTENT_TYPE, "audio/wav"),
                    (CONTENT_DISPOSITION, "attachment; filename=\"encoded.wav\""),
                ],
                audio,
            )
                .into_response()
        }
        Err(err) => {
            log_failure(&category_encode(), &err);
            err.into_response()
        }
    }
}

async fn encode_text(state: &SharedState, request: Request) -> Result<Vec<u8>, GatewayError> {
    let text = read_text_field(request).await?;
    if text.is_empty() {
        return Err(GatewayError::Validation("No text provided".to_string()));
    }
    info!(
        "{} encoding {} characters",
        category_encode(),
        text.chars().count()
    );

    let binary = state.config.to_file_binary.as_path();
    let input = format!("{text}\n").into_bytes();
    let artifact = TempArtifact::allocate(&state.config.temp_dir);

    let mut file_arg = OsString::from("-f");
    file_arg.push(artifact.path());
    state
        .runner
        .run(binary, &[file_arg], Some(&input))
        .await
        .map_err(|err| GatewayError::from_process(Operation::Encode, err))?;

    if let Some(audio) = artifact
        .read_non_empty()
        .await
        .map_err(|err| GatewayError::Unexpected(err.to_string()))?
    {
        return Ok(audio);
    }

    debug!(
        "{} no audio at {}; retrying with stdout capture",
        category_encode(),
        artifact.path().display()
    );
    let output = state
        .runner
        .run(binary, &[], Some(&input))
        .await
        .map_err(|err| GatewayError::from_process(Operation::Encode, err))?;
    if output.stdout.starts_with(RIFF_SIGNATURE) {
        Ok(output.stdout)
    } else {
        Err(GatewayError::EncodingFailed)
    }
}

/// Pulls `text` out of a JSON, urlencoded or multipart body.
async fn read_text_field(request: Request) -> Result<String, GatewayError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    let invalid = |err: String| GatewayError::Validation(format!("Invalid request body: {err}"));

    let text = if content_type.starts_with("application/json") {
        let Json(body) = Json::<EncodeRequest>::from_request(request, &())
            .await
            .map_err(|err| invalid(err.body_text()))?;
        body.text
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(body) = Form::<EncodeRequest>::from_request(request, &())
            .await
            .map_err(|err| invalid(err.body_text()))?;
        body.text
    } else if content_type.starts_with("multipart/form-data") {
        let mut multipart = Multipart::from_request(request, &())
            .await
            .map_err(|err| invalid(err.body_text()))?;
        let mut text = None;
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| invalid(err.body_text()))?
        {
            if field.name() == Some("text") {
                text = Some(field.text().await.map_err(|err| invalid(err.body_text()))?);
                break;
            }
        }
        text
    } else {
        None
    };

    text.ok_or_else(|| GatewayError::Validation("No text provided".to_string()))
}

pub(super) async fn decode_handler(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let started = Instant::now();
    match decode_upload(&state, multipart, started).await {
        Ok(result) => {
            info!(
                "{} decoded {} characters in {:.2}s",
                category_decode(),
                result.message_length,
                started.elapsed().as_secs_f64()
            );
            let processing_thread = std::thread::current()
                .name()
                .unwrap_or("unnamed")
                .to_string();
            (
                StatusCode::OK,
                Json(DecodeResponse {
                    result,
                    processing_thread,
                }),
            )
                .into_response()
        }
        Err(err) => {
            log_failure(&category_decode(), &err);
            err.into_response()
        }
    }
}

async fn decode_upload(
    state: &SharedState,
    multipart: Result<Multipart, MultipartRejection>,
    started: Instant,
) -> Result<DecodeResult, GatewayError> {
    let mut multipart = multipart.map_err(|_| no_file())?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| GatewayError::Validation(format!("Invalid multipart body: {err}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let bytes = field
            .bytes()
            .await
            .map_err(|err| GatewayError::Validation(format!("Invalid multipart body: {err}")))?;
        upload = Some((filename, bytes));
        break;
    }

    let Some((filename, bytes)) = upload else {
        return Err(no_file());
    };
    let Some(filename) = filename.filter(|name| name.ends_with(".wav")) else {
        return Err(GatewayError::Validation(
            "File must be a WAV file".to_string(),
        ));
    };
    info!(
        "{} decoding {filename} ({} bytes)",
        category_decode(),
        bytes.len()
    );

    let artifact = TempArtifact::persist(&state.config.temp_dir, &bytes)
        .await
        .map_err(|err| GatewayError::Unexpected(err.to_string()))?;
    let output = state
        .runner
        .run(
            state.config.from_file_binary.as_path(),
            &[artifact.path().as_os_str().to_os_string()],
            None,
        )
        .await
        .map_err(|err| GatewayError::from_process(Operation::Decode, err))?;

    debug!(
        "{} decoder exited with {:?} after {:.3}s",
        category_decode(),
        output.exit_code,
        output.elapsed.as_secs_f64()
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    let raw = stdout.trim();
    if !output.success() {
        return Err(GatewayError::ProcessExecution {
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            stdout: raw.to_string(),
        });
    }

    let mut result = parse_decode_output(raw);
    let processing_time_seconds = round_millis(started.elapsed().as_secs_f64());
    if !result.success {
        return Err(GatewayError::Parse {
            details: result.error.unwrap_or_else(|| {
                "decoder output did not contain completion marker".to_string()
            }),
            processing_time_seconds,
        });
    }
    result.processing_time_seconds = Some(processing_time_seconds);
    Ok(result)
}

fn no_file() -> GatewayError {
    GatewayError::Validation("No file provided".to_string())
}

fn log_failure(category: &str, err: &GatewayError) {
    if err.status_code().is_server_error() {
        error!("{category} {err} ({})", err.status_code().as_u16());
    } else {
        warn!("{category} {err} ({})", err.status_code().as_u16());
    }
}

pub(super) async fn health_handler(State(state): State<SharedState>) -> Response {
    match health_report(&state).await {
        Ok(report) => {
            let status = if report.status == "healthy" {
                StatusCode::OK
            } else {
                warn!("{} service degraded", category_health());
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(report)).into_response()
        }
        Err(err) => {
            error!("{} health check failed: {err}", category_health());
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "error": err,
                    "timestamp_unix_ms": now_unix_ms(),
                })),
            )
                .into_response()
        }
    }
}

async fn health_report(state: &SharedState) -> Result<HealthReport, String> {
    let to_file = state.config.to_file_binary.clone();
    let from_file = state.config.from_file_binary.clone();
    let (system, binaries) = tokio::task::spawn_blocking(move || {
        let binaries = BinaryReport {
            to_file: is_executable(&to_file),
            from_file: is_executable(&from_file),
        };
        (sample_system(), binaries)
    })
    .await
    .map_err(|err| format!("system sampling failed: {err}"))?;

    let service_metrics = state.metrics_snapshot();
    let saturated =
        service_metrics.active_requests >= state.config.max_concurrent_requests as u64;
    let degraded = system.over_limit() || !binaries.to_file || !binaries.from_file || saturated;

    Ok(HealthReport {
        status: if degraded { "degraded" } else { "healthy" },
        timestamp_unix_ms: now_unix_ms(),
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        thread_pool: ThreadPoolReport {
            max_workers: state.config.max_workers,
            runtime_workers: tokio::runtime::Handle::current().metrics().num_workers(),
        },
        system,
        service_metrics,
        binaries,
        configuration: ConfigurationReport {
            max_concurrent_requests: state.config.max_concurrent_requests,
            request_timeout: state.config.request_timeout.as_secs(),
            log_level: state.config.log_level.clone(),
        },
    })
}

pub(super) async fn metrics_handler(State(state): State<SharedState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics_snapshot().render_exposition(),
    )
}
