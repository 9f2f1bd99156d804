// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn plain_form_never_fails() {
    let dsn = Dsn::parse("native").unwrap();
    assert_eq!(dsn.name, "native");
    assert!(dsn.namespace.is_none());
    assert!(dsn.params.is_empty());
}

#[test]
fn short_form_parses_pairs() {
    let dsn = Dsn::parse("docker:host=tcp://1.2.3.4:2375,cache_ttl=3600").unwrap();
    assert_eq!(dsn.name, "docker");
    assert_eq!(dsn.params.raw("host"), Some("tcp://1.2.3.4:2375"));
    assert_eq!(dsn.params.raw("cache_ttl"), Some("3600"));
}

#[test]
fn short_form_tolerates_bare_flags() {
    let dsn = Dsn::parse("qemu:accel=kvm,debug").unwrap();
    assert_eq!(dsn.params.raw("debug"), Some(""));
}

#[test]
fn url_form_parses_namespace_and_query() {
    let dsn = Dsn::parse("k8s://builds?kubeconfig=/tmp/kc&namespace=ci").unwrap();
    assert_eq!(dsn.name, "k8s");
    assert_eq!(dsn.namespace.as_deref(), Some("builds"));
    assert_eq!(dsn.params.raw("kubeconfig"), Some("/tmp/kc"));
    assert_eq!(dsn.params.raw("namespace"), Some("ci"));
}

#[test]
fn url_form_with_empty_namespace() {
    let dsn = Dsn::parse("docker://?host=unix:///var/run/docker.sock").unwrap();
    assert!(dsn.namespace.is_none());
    assert_eq!(dsn.params.raw("host"), Some("unix:///var/run/docker.sock"));
}

#[parameterized(
    empty_name = { "://ns" },
    slash_in_namespace = { "k8s://a/b" },
    pair_without_equals = { "k8s://ns?flag" },
)]
fn url_form_rejects_malformed(input: &str) {
    assert!(matches!(Dsn::parse(input), Err(DriverError::Config(_))));
}

#[parameterized(
    plain = { "native" },
    short = { "docker:host=tcp://h:1" },
    url = { "k8s://builds?kubeconfig=/tmp/kc" },
    url_no_params = { "qemu://sandbox" },
)]
fn parse_render_round_trips(input: &str) {
    let dsn = Dsn::parse(input).unwrap();
    let rendered = dsn.render();
    let again = Dsn::parse(&rendered).unwrap();
    assert_eq!(again, dsn);
    assert_eq!(again.render(), rendered);
}

#[test]
fn params_prefer_dsn_over_env() {
    // Not using the environment here on purpose: the DSN entry must win
    // without ever consulting it.
    let params = DriverParams::from_pairs([("memory", "1024")]);
    assert_eq!(params.get_or("memory", "512"), "1024");
    assert_eq!(params.get_u64_or("memory", 512), 1024);
}

#[test]
fn params_fall_back_to_default() {
    let params = DriverParams::default();
    assert_eq!(params.get_or("no_such_key_here", "fallback"), "fallback");
    assert_eq!(params.get_u64_or("no_such_key_here", 7), 7);
}

#[test]
fn garbage_numeric_param_uses_default() {
    let params = DriverParams::from_pairs([("cpus", "many")]);
    assert_eq!(params.get_u64_or("cpus", 2), 2);
}
