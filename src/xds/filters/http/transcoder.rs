//! gRPC-JSON transcoder filter construction
//!
//! For gRPC backends the proxy transcodes JSON/HTTP requests into gRPC. The
//! transcoder needs the original protobuf file descriptor set, which the
//! service config carries as a `FILE_DESCRIPTOR_SET_PROTO` source file; the
//! first such entry is embedded whole. Without one the filter is omitted and
//! the listener falls back to HTTP-only behavior.

use envoy_types::pb::envoy::extensions::filters::http::grpc_json_transcoder::v3::{
    grpc_json_transcoder::DescriptorSet, GrpcJsonTranscoder,
};
use envoy_types::pb::envoy::extensions::filters::network::http_connection_manager::v3::{
    http_filter::ConfigType, HttpFilter,
};

use crate::service_config::{Api, ConfigFileType, Service, SourceFile};
use crate::xds::filters::any_from_message;

const TRANSCODER_TYPE_URL: &str =
    "type.googleapis.com/envoy.extensions.filters.http.grpc_json_transcoder.v3.GrpcJsonTranscoder";

/// Build the transcoder filter from the first descriptor set source file.
pub fn build_transcoder_filter(service: &Service, endpoint_api: &Api) -> Option<HttpFilter> {
    let source_info = service.source_info.as_ref()?;

    for source_file in &source_info.source_files {
        let SourceFile::ConfigFile(config_file) = source_file else {
            continue;
        };
        if config_file.file_type != ConfigFileType::FileDescriptorSetProto {
            continue;
        }

        let transcoder = GrpcJsonTranscoder {
            descriptor_set: Some(DescriptorSet::ProtoDescriptorBin(
                config_file.file_contents.0.clone(),
            )),
            services: vec![endpoint_api.name.clone()],
            ..Default::default()
        };

        return Some(HttpFilter {
            name: super::GRPC_JSON_TRANSCODER.to_string(),
            config_type: Some(ConfigType::TypedConfig(any_from_message(
                TRANSCODER_TYPE_URL,
                &transcoder,
            ))),
            ..Default::default()
        });
    }

    None
}
