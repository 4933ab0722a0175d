use crate::tree::Node;

fn hash(yaml: &str) -> anyhow::Result<String> {
    let root: Node = serde_yaml::from_str(yaml)?;
    let kind = root.get_str("kind").unwrap_or_default().to_owned();
    Ok(super::shorthash(&kind, &root)?.to_string())
}

/// Check `body` hashes to `expected` as a resource of `kind`. Values match kubectl's.
fn check(kind: &str, cases: &[(&str, &str)]) -> anyhow::Result<()> {
    for &(body, expected) in cases {
        let yaml = match body {
            "" => format!("{{apiVersion: v1, kind: {kind}}}"),
            body => format!("{{apiVersion: v1, kind: {kind}, {body}}}"),
        };
        assert_eq!(hash(&yaml)?, expected, "{kind} with {body}");
    }
    Ok(())
}

#[test]
fn config_map_hashes() -> anyhow::Result<()> {
    check(
        "ConfigMap",
        &[
            ("", "6ct58987ht"),
            ("data: {one: ''}", "9g67k2htb6"),
            // Keys are hashed in sorted order.
            ("data: {two: 2, one: '', three: 3}", "7757f9kkct"),
            ("binaryData: {}", "6ct58987ht"),
            ("binaryData: {one: ''}", "6mtk2m274t"),
            ("binaryData: {two: 2, one: '', three: 3}", "9th7kc28dg"),
            ("data: {one: ''}, binaryData: {two: ''}", "698h7c7t9m"),
        ],
    )
}

#[test]
fn secret_hashes() -> anyhow::Result<()> {
    check(
        "Secret",
        &[
            ("type: my-type", "5gmgkf8578"),
            ("type: my-type, data: {one: ''}", "74bd68bm66"),
            ("type: my-type, data: {two: 2, one: '', three: 3}", "4gf75c7476"),
            ("type: my-type, data: {one: ''}, stringData: {two: 2}", "c4h4264gdb"),
            ("type: my-type, data: {one: ''}, stringData: {}", "74bd68bm66"),
        ],
    )
}

#[test]
fn unsupported_kind_is_an_error() {
    let err = hash("{apiVersion: v1, kind: Service, metadata: {name: svc}}").unwrap_err();
    assert!(err.to_string().contains("`Service`"), "{err}");
}

#[test]
fn html_characters_are_escaped_like_go() {
    assert_eq!(super::html_escape("a<b>&c\u{2028}"), "a\\u003cb\\u003e\\u0026c\\u2028");
    assert!(matches!(super::html_escape("plain"), std::borrow::Cow::Borrowed(_)));
}

#[test]
fn hash_ignores_metadata() -> anyhow::Result<()> {
    let bare = hash("{apiVersion: v1, kind: ConfigMap, data: {a: b}}")?;
    let named = hash(
        "{apiVersion: v1, kind: ConfigMap, metadata: {name: cm, labels: {x: y}}, data: {a: b}}",
    )?;
    assert_eq!(bare, named);
    Ok(())
}
