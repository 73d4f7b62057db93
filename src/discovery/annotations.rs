//! Pod annotation contract for autodiscovery
//!
//! A pod opts in with `datakit/<input>.instances: <toml>`; the value `off`
//! opts out for that key. `datakit/<input>.instances.ip_index` picks which
//! entry of `status.podIPs` replaces `$IP`.

use crate::k8s::types::PodInfo;
use md5::{Digest, Md5};
use tracing::debug;

pub const ANNOTATION_PREFIX: &str = "datakit/";
pub const INSTANCES_SUFFIX: &str = ".instances";
pub const IP_INDEX_SUFFIX: &str = ".ip_index";
pub const DISABLED: &str = "off";

/// One configuration blob found on a pod, placeholders already substituted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredConfig {
    pub input: String,
    pub annotation: String,
    pub text: String,
    pub hash: String,
}

/// All enabled configurations carried by the pod's annotations
pub fn discover(pod: &PodInfo) -> Vec<DiscoveredConfig> {
    let mut found = Vec::new();

    for (key, value) in &pod.annotations {
        let Some(input) = key
            .strip_prefix(ANNOTATION_PREFIX)
            .and_then(|rest| rest.strip_suffix(INSTANCES_SUFFIX))
        else {
            continue;
        };
        if input.is_empty() {
            continue;
        }
        if value.trim() == DISABLED {
            debug!(pod = %pod.name, annotation = %key, "Autodiscovery disabled");
            continue;
        }

        let index_key = format!("{}{}", key, IP_INDEX_SUFFIX);
        let ip = select_ip(pod, pod.annotations.get(&index_key).map(String::as_str));
        let text = canonicalize(&substitute(value, pod, &ip));
        if text.is_empty() {
            continue;
        }

        found.push(DiscoveredConfig {
            input: input.to_string(),
            annotation: key.clone(),
            hash: config_hash(&text),
            text,
        });
    }
    found
}

/// Pod IP at `index` in `podIPs`, falling back to `podIP`
pub fn select_ip(pod: &PodInfo, index: Option<&str>) -> String {
    index
        .and_then(|i| i.trim().parse::<usize>().ok())
        .and_then(|i| pod.pod_ips.get(i).cloned())
        .unwrap_or_else(|| pod.pod_ip.clone())
}

pub fn substitute(text: &str, pod: &PodInfo, ip: &str) -> String {
    text.replace("$IP", ip)
        .replace("$NAMESPACE", &pod.namespace)
        .replace("$PODNAME", &pod.name)
        .replace("$NODENAME", &pod.node_name)
}

/// Lines trimmed, blank lines dropped, joined with `\n`
pub fn canonicalize(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Hex MD5 of the canonical text
pub fn config_hash(canonical: &str) -> String {
    hex::encode(Md5::digest(canonical.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pod(annotations: &[(&str, &str)]) -> PodInfo {
        PodInfo {
            name: "web-0".to_string(),
            namespace: "shop".to_string(),
            node_name: "node-a".to_string(),
            pod_ip: "10.0.0.5".to_string(),
            pod_ips: vec!["10.0.0.5".to_string(), "fd00::5".to_string()],
            annotations: annotations
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_hash_is_md5_hex() {
        assert_eq!(config_hash(""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(config_hash("abc"), "900150983cd24fb0d6963f7d28e17f72");
    }

    #[test]
    fn test_canonicalize_ignores_whitespace_differences() {
        let a = "[[inputs.prom]]\n  url = \"http://x\"\n\n";
        let b = "  [[inputs.prom]]\r\nurl = \"http://x\"   ";
        assert_eq!(canonicalize(a), canonicalize(b));
        assert_eq!(config_hash(&canonicalize(a)), config_hash(&canonicalize(b)));
    }

    #[test]
    fn test_discover_substitutes_placeholders() {
        let p = pod(&[(
            "datakit/prom.instances",
            "[[inputs.prom]]\nurl = \"http://$IP:9100/metrics\"\n[inputs.prom.tags]\nns = \"$NAMESPACE\"\npod = \"$PODNAME\"\nnode = \"$NODENAME\"",
        )]);

        let found = discover(&p);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].input, "prom");
        assert!(found[0].text.contains("http://10.0.0.5:9100/metrics"));
        assert!(found[0].text.contains("ns = \"shop\""));
        assert!(found[0].text.contains("pod = \"web-0\""));
        assert!(found[0].text.contains("node = \"node-a\""));
        assert_eq!(found[0].hash, config_hash(&found[0].text));
    }

    #[test]
    fn test_off_and_unrelated_annotations_are_skipped() {
        let p = pod(&[
            ("datakit/prom.instances", "off"),
            ("datakit/prom.instances.ip_index", "1"),
            ("prometheus.io/scrape", "true"),
            ("datakit/.instances", "[[inputs.x]]"),
        ]);
        assert!(discover(&p).is_empty());
    }

    #[test]
    fn test_ip_index_selects_pod_ip() {
        let p = pod(&[
            ("datakit/prom.instances", "[[inputs.prom]]\nurl = \"http://[$IP]:9100\""),
            ("datakit/prom.instances.ip_index", "1"),
        ]);
        let found = discover(&p);
        assert!(found[0].text.contains("http://[fd00::5]:9100"));

        assert_eq!(select_ip(&p, Some("7")), "10.0.0.5");
        assert_eq!(select_ip(&p, Some("x")), "10.0.0.5");
        assert_eq!(select_ip(&p, None), "10.0.0.5");
    }

    #[test]
    fn test_same_config_on_different_pods_hashes_differently_after_substitution() {
        let text = "[[inputs.prom]]\nurl = \"http://$IP:9100\"";
        let a = pod(&[("datakit/prom.instances", text)]);
        let mut b = a.clone();
        b.pod_ip = "10.0.0.6".to_string();
        b.pod_ips.clear();

        assert_ne!(discover(&a)[0].hash, discover(&b)[0].hash);
    }
}
