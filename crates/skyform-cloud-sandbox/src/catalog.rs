//! Built-in machine image catalog
//!
//! Stands in for the public image registry. Filter values accept `*` and
//! `?` wildcards, several values in one filter match any of them, and all
//! filters must match.

use crate::error::{Result, SandboxError};
use glob::Pattern;
use regex::Regex;
use serde::Serialize;

/// Debian's publishing account
pub const DEBIAN_OWNER: &str = "136693071363";

#[derive(Debug, Clone, Serialize)]
pub struct Image {
    pub image_id: &'static str,
    pub name: &'static str,
    pub owner_id: &'static str,
    pub architecture: &'static str,
    pub virtualization_type: &'static str,
    pub creation_date: &'static str,
    pub root_device_name: &'static str,
}

impl Image {
    fn field(&self, filter: &str) -> Option<&'static str> {
        match filter {
            "name" => Some(self.name),
            "image-id" => Some(self.image_id),
            "owner-id" => Some(self.owner_id),
            "architecture" => Some(self.architecture),
            "virtualization-type" => Some(self.virtualization_type),
            "root-device-name" => Some(self.root_device_name),
            _ => None,
        }
    }
}

static IMAGES: &[Image] = &[
    Image {
        image_id: "ami-0d1c47ab964ae2b87",
        name: "debian-12-amd64-20240702-1796",
        owner_id: DEBIAN_OWNER,
        architecture: "x86_64",
        virtualization_type: "hvm",
        creation_date: "2024-07-02T06:12:41.000Z",
        root_device_name: "/dev/xvda",
    },
    Image {
        image_id: "ami-0e4a0595b254f1a4f",
        name: "debian-12-amd64-20240901-1857",
        owner_id: DEBIAN_OWNER,
        architecture: "x86_64",
        virtualization_type: "hvm",
        creation_date: "2024-09-01T08:33:17.000Z",
        root_device_name: "/dev/xvda",
    },
    Image {
        image_id: "ami-07b1a6d4f6a8e3c20",
        name: "debian-12-arm64-20240901-1857",
        owner_id: DEBIAN_OWNER,
        architecture: "arm64",
        virtualization_type: "hvm",
        creation_date: "2024-09-01T08:35:02.000Z",
        root_device_name: "/dev/xvda",
    },
    Image {
        image_id: "ami-0a5c3558529277641",
        name: "debian-11-amd64-20240717-1811",
        owner_id: DEBIAN_OWNER,
        architecture: "x86_64",
        virtualization_type: "hvm",
        creation_date: "2024-07-17T10:01:55.000Z",
        root_device_name: "/dev/xvda",
    },
    Image {
        image_id: "ami-0f9ae750e8274075b",
        name: "ubuntu/images/hvm-ssd/ubuntu-jammy-22.04-amd64-server-20240927",
        owner_id: "099720109477",
        architecture: "x86_64",
        virtualization_type: "hvm",
        creation_date: "2024-09-27T12:00:00.000Z",
        root_device_name: "/dev/sda1",
    },
];

/// Image lookup criteria
#[derive(Debug, Clone, Default)]
pub struct ImageQuery {
    pub owners: Vec<String>,
    pub filters: Vec<(String, Vec<String>)>,
    pub name_regex: Option<String>,
    pub most_recent: bool,
}

/// Find the single image matching `query`
///
/// Several matches without `most_recent` is an error, as is no match.
pub fn find_image(query: &ImageQuery) -> Result<&'static Image> {
    let mut filters = Vec::with_capacity(query.filters.len());
    for (name, values) in &query.filters {
        if IMAGES[0].field(name).is_none() {
            return Err(SandboxError::InvalidParameter(format!(
                "unsupported image filter: {}",
                name
            )));
        }
        let patterns = values
            .iter()
            .map(|v| {
                Pattern::new(v).map_err(|e| {
                    SandboxError::InvalidParameter(format!("filter {}: {}", name, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        filters.push((name.as_str(), patterns));
    }
    let name_regex = query
        .name_regex
        .as_deref()
        .map(Regex::new)
        .transpose()
        .map_err(|e| SandboxError::InvalidParameter(format!("name_regex: {}", e)))?;

    let mut matches: Vec<&'static Image> = IMAGES
        .iter()
        .filter(|image| query.owners.iter().any(|o| o == image.owner_id || o == "self"))
        .filter(|image| {
            filters.iter().all(|(name, patterns)| {
                image
                    .field(name)
                    .is_some_and(|value| patterns.iter().any(|p| p.matches(value)))
            })
        })
        .filter(|image| name_regex.as_ref().is_none_or(|re| re.is_match(image.name)))
        .collect();

    match matches.len() {
        0 => Err(SandboxError::NoMatchingImage {
            owners: query.owners.clone(),
        }),
        1 => Ok(matches[0]),
        n if !query.most_recent => Err(SandboxError::AmbiguousImage(n)),
        _ => {
            // ISO 8601 timestamps sort lexically
            matches.sort_by_key(|image| image.creation_date);
            matches
                .pop()
                .ok_or(SandboxError::NoMatchingImage { owners: Vec::new() })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debian_query(most_recent: bool) -> ImageQuery {
        ImageQuery {
            owners: vec![DEBIAN_OWNER.to_string()],
            filters: vec![
                ("name".to_string(), vec!["debian-12-amd64-*".to_string()]),
                ("virtualization-type".to_string(), vec!["hvm".to_string()]),
            ],
            name_regex: None,
            most_recent,
        }
    }

    #[test]
    fn test_most_recent_debian_12() {
        let image = find_image(&debian_query(true)).unwrap();
        assert_eq!(image.name, "debian-12-amd64-20240901-1857");
        assert_eq!(image.architecture, "x86_64");
    }

    #[test]
    fn test_ambiguous_without_most_recent() {
        assert!(matches!(
            find_image(&debian_query(false)),
            Err(SandboxError::AmbiguousImage(2))
        ));
    }

    #[test]
    fn test_owner_must_match() {
        let mut query = debian_query(true);
        query.owners = vec!["099720109477".to_string()];
        assert!(matches!(
            find_image(&query),
            Err(SandboxError::NoMatchingImage { .. })
        ));
    }

    #[test]
    fn test_unknown_filter() {
        let mut query = debian_query(true);
        query
            .filters
            .push(("hypervisor".to_string(), vec!["xen".to_string()]));
        assert!(matches!(
            find_image(&query),
            Err(SandboxError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_name_regex() {
        let mut query = debian_query(true);
        query.name_regex = Some("-20240702-".to_string());
        assert_eq!(find_image(&query).unwrap().image_id, "ami-0d1c47ab964ae2b87");
    }
}
