//! `GET|HEAD /dl/{token}/{id}/{name}` — the streaming download handler.

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{header, HeaderMap};
use axum::response::{IntoResponse, Response};
use rand::RngCore;

use crate::error::{GatewayError, GatewayResult};
use crate::protocol_constants::{CHUNK_SIZE, SECURE_HASH_LEN, SKIP_HASH_CHECK, STREAM_ID_BYTES};
use crate::quota::{spawn_usage_tracker, verify_token};
use crate::range::{ChunkPlan, parse_range_header};
use crate::stream::{build_stream, PipelineParams, StreamMeta};
use crate::upstream::selector::select_best_client;

use super::AppState;

fn random_stream_id() -> String {
    let mut bytes = [0u8; STREAM_ID_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn random_filename() -> String {
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("{}.bin", hex::encode(bytes))
}

/// Resolves `file_name`/`mime_type` the same way the reference handler does:
/// descriptor values first, then a guess from the name, then a hard default;
/// an extension is appended to an extension-less name once the mime type is
/// known.
fn resolve_name_and_mime(
    file_name: Option<String>,
    mime_type: Option<String>,
) -> (String, String) {
    let mut file_name = file_name.unwrap_or_else(random_filename);
    let mime_type = mime_type.unwrap_or_else(|| {
        mime_guess::from_path(&file_name)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string()
    });

    if !file_name.contains('.') {
        if let Some((_, subtype)) = mime_type.split_once('/') {
            file_name = format!("{file_name}.{subtype}");
        }
    }

    (file_name, mime_type)
}

pub(super) async fn stream_download(
    Path((token, id, _name)): Path<(String, String, String)>,
    State(state): State<AppState>,
    ConnectInfo(remote_addr): ConnectInfo<std::net::SocketAddr>,
    headers: HeaderMap,
) -> GatewayResult<Response> {
    let token_record = verify_token(state.token_store.as_ref(), &token).await?;

    let msg = state.id_codec.decode(&id)?;

    // The reference backend resolves the file once via the globally
    // least-loaded client to derive a hash fingerprint, then resolves again
    // via the client actually selected to serve the DC, and compares the
    // two. A mismatch means the two resolutions disagree about which file
    // this message carries.
    let least_loaded = (0..state.upstream.client_count())
        .min_by_key(|&idx| state.workloads.get(idx))
        .unwrap_or(0);
    let preliminary = state.file_cache.get_file(least_loaded, msg).await?;
    let secure_hash = preliminary.unique_id[..SECURE_HASH_LEN.min(preliminary.unique_id.len())]
        .to_string();

    let client_index = select_best_client(state.upstream.as_ref(), &state.workloads, preliminary.dc_id);
    let descriptor = state.file_cache.get_file(client_index, msg).await?;

    if secure_hash != SKIP_HASH_CHECK {
        let actual = &descriptor.unique_id[..SECURE_HASH_LEN.min(descriptor.unique_id.len())];
        if actual != secure_hash {
            return Err(GatewayError::InvalidHash);
        }
    }

    if descriptor.size == 0 {
        let (file_name, mime_type) =
            resolve_name_and_mime(descriptor.file_name.clone(), descriptor.mime_type.clone());
        return Response::builder()
            .status(axum::http::StatusCode::OK)
            .header(header::CONTENT_TYPE, mime_type)
            .header(header::CONTENT_LENGTH, "0")
            .header(
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{file_name}\""),
            )
            .header(header::ACCEPT_RANGES, "bytes")
            .body(Body::empty())
            .map_err(|e| GatewayError::Internal(e.to_string()));
    }

    let range_header = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok());
    let range = parse_range_header(range_header, descriptor.size)?;
    let req_length = range.end - range.start + 1;
    let plan = ChunkPlan::for_range(range, CHUNK_SIZE);

    let session = state
        .session_pool
        .session_for(client_index, descriptor.dc_id)
        .await
        .map_err(GatewayError::SessionFailure)?;

    let stream_id = random_stream_id();
    let meta = StreamMeta {
        request_path: format!("/dl/{token}/{id}/{_name}"),
        client_host: Some(remote_addr.ip().to_string()),
    };

    state.stream_registry.create(
        stream_id.clone(),
        msg.msg_id,
        msg.chat_id,
        descriptor.dc_id,
        client_index,
        plan.part_count,
        state.config.pipeline.prefetch,
        state.config.pipeline.parallelism,
        meta,
    );

    let params = PipelineParams {
        stream_id: stream_id.clone(),
        client_index,
        session,
        location: descriptor.location.clone(),
        offset: plan.offset,
        first_part_cut: plan.first_part_cut,
        last_part_cut: plan.last_part_cut,
        part_count: plan.part_count,
        chunk_size: CHUNK_SIZE,
        prefetch: state.config.pipeline.prefetch,
        parallelism: state.config.pipeline.parallelism,
    };

    let body_stream = build_stream(
        std::sync::Arc::clone(&state.upstream),
        std::sync::Arc::clone(&state.stream_registry),
        std::sync::Arc::clone(&state.workloads),
        params,
    );

    spawn_usage_tracker(
        std::sync::Arc::clone(&state.token_store),
        std::sync::Arc::clone(&state.stream_registry),
        token,
        stream_id.clone(),
    );

    let (file_name, mime_type) =
        resolve_name_and_mime(descriptor.file_name.clone(), descriptor.mime_type.clone());

    let mut builder = Response::builder()
        .header(header::CONTENT_TYPE, &mime_type)
        .header(header::CONTENT_LENGTH, req_length.to_string())
        .header(
            header::CONTENT_DISPOSITION,
            format!("inline; filename=\"{file_name}\""),
        )
        .header(header::ACCEPT_RANGES, "bytes")
        .header(header::CACHE_CONTROL, "public, max-age=3600, immutable")
        .header(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")
        .header(
            header::ACCESS_CONTROL_EXPOSE_HEADERS,
            "Content-Length, Content-Range, Accept-Ranges",
        )
        .header("X-Stream-Id", &stream_id);

    builder = if range_header.is_some() {
        builder
            .status(axum::http::StatusCode::PARTIAL_CONTENT)
            .header(
                header::CONTENT_RANGE,
                format!("bytes {}-{}/{}", range.start, range.end, descriptor.size),
            )
    } else {
        builder.status(axum::http::StatusCode::OK)
    };

    if let crate::quota::QuotaStatus::Exceeded(kind) = token_record.quota_status() {
        log::debug!("[Download] token over {kind:?} quota for stream {stream_id}; streaming anyway (advisory)");
    }

    builder
        .body(Body::from_stream(body_stream))
        .map_err(|e| GatewayError::Internal(e.to_string()))
}
