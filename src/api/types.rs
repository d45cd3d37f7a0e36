//! Wire types for the VM cluster API.
//!
//! Field names follow the cluster's JSON contract (camelCase). Request
//! bodies borrow so callers never clone just to serialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TokenRequest<'a> {
    pub user: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCopyRequest<'a> {
    pub source_image: &'a str,
    pub dest_image: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VmCreateRequest<'a> {
    pub name: &'a str,
    pub image: &'a str,
    pub base_image: &'a str,
    pub cpu_core: u32,
    pub vcpu_count: u32,
}

#[derive(Debug, Serialize)]
pub struct VmDeployRequest<'a> {
    pub name: &'a str,
}

/// Deploy is the one response whose body is load-bearing: it carries the
/// coordinates the rest of the run depends on. The port is a string on
/// the wire.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VmDeployResponse {
    pub vm_id: String,
    pub ip: String,
    pub ssh_port: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageCommitRequest<'a> {
    pub vm_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageSaveRequest<'a> {
    pub vm_id: &'a str,
    pub image_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageDeleteRequest<'a> {
    pub image_name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct VmPurgeRequest<'a> {
    pub name: &'a str,
}

/// Acknowledgement body most operations return. The message is cosmetic,
/// so a missing or empty one is fine.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ApiMessage {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vm_create_request_uses_wire_field_names() {
        let request = VmCreateRequest {
            name: "kiln-builder",
            image: "ci-agent.img",
            base_image: "kiln-builder",
            cpu_core: 3,
            vcpu_count: 3,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "kiln-builder",
                "image": "ci-agent.img",
                "baseImage": "kiln-builder",
                "cpuCore": 3,
                "vcpuCount": 3,
            })
        );
    }

    #[test]
    fn image_copy_request_uses_wire_field_names() {
        let request = ImageCopyRequest {
            source_image: "base.img",
            dest_image: "out.img",
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"sourceImage": "base.img", "destImage": "out.img"})
        );
    }

    #[test]
    fn save_and_delete_requests_use_wire_field_names() {
        let save = serde_json::to_value(ImageSaveRequest {
            vm_id: "vm-1",
            image_name: "out.img",
        })
        .unwrap();
        assert_eq!(save, json!({"vmId": "vm-1", "imageName": "out.img"}));

        let delete = serde_json::to_value(ImageDeleteRequest {
            image_name: "out.img",
        })
        .unwrap();
        assert_eq!(delete, json!({"imageName": "out.img"}));
    }

    #[test]
    fn deploy_response_parses_wire_body() {
        let body = r#"{"vmId": "vm-1", "ip": "10.0.0.5", "sshPort": "2222"}"#;
        let parsed: VmDeployResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.vm_id, "vm-1");
        assert_eq!(parsed.ip, "10.0.0.5");
        assert_eq!(parsed.ssh_port, "2222");
    }

    #[test]
    fn deploy_response_missing_field_is_an_error() {
        let body = r#"{"ip": "10.0.0.5"}"#;
        assert!(serde_json::from_str::<VmDeployResponse>(body).is_err());
    }

    #[test]
    fn api_message_tolerates_missing_message() {
        let parsed: ApiMessage = serde_json::from_str("{}").unwrap();
        assert!(parsed.message.is_empty());
    }

    #[test]
    fn token_response_tolerates_missing_token() {
        let parsed: TokenResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.token.is_empty());
    }
}
