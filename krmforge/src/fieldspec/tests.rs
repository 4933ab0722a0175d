use super::*;
use crate::resource::Resource;

fn resource(yaml: &str) -> Resource {
    serde_yaml::from_str(yaml).unwrap()
}

fn spec(yaml: &str) -> FieldSpec {
    serde_yaml::from_str(yaml).unwrap()
}

const DEPLOYMENT: &str = r#"
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  template:
    spec:
      containers:
      - name: app
        image: nginx:1.25
      - name: sidecar
        image: envoy
"#;

#[test]
fn parse_field_paths() -> anyhow::Result<()> {
    let path = "spec/template/spec/containers[]/image".parse::<FieldPath>()?;
    assert_eq!(
        &path[..],
        [
            FieldPathSegment::Field("spec".into()),
            FieldPathSegment::Field("template".into()),
            FieldPathSegment::Field("spec".into()),
            FieldPathSegment::Array("containers".into()),
            FieldPathSegment::Field("image".into()),
        ]
    );

    let path = "spec/containers/[]/name".parse::<FieldPath>()?;
    assert_eq!(path[2], FieldPathSegment::Elements);

    let path = r"metadata/annotations/example.com\/owner".parse::<FieldPath>()?;
    assert_eq!(path.len(), 3);
    assert_eq!(path[2], FieldPathSegment::Field("example.com/owner".into()));
    assert_eq!(path.to_string(), r"metadata/annotations/example.com\/owner");
    Ok(())
}

#[test]
fn empty_paths_are_rejected() {
    assert!("".parse::<FieldPath>().is_err());
    assert!("spec//name".parse::<FieldPath>().is_err());
    assert!("spec/".parse::<FieldPath>().is_err());
}

#[test]
fn locate_fans_out_in_sequence_order() -> anyhow::Result<()> {
    let res = resource(DEPLOYMENT);
    let spec = spec("path: spec/template/spec/containers[]/image\nkind: Deployment");
    let locations = spec.locate(&res)?;
    let rendered = locations.iter().map(ToString::to_string).collect::<Vec<_>>();
    assert_eq!(
        rendered,
        [
            "spec/template/spec/containers/0/image",
            "spec/template/spec/containers/1/image",
        ]
    );
    Ok(())
}

#[test]
fn locate_is_idempotent() -> anyhow::Result<()> {
    let res = resource(DEPLOYMENT);
    let spec = spec("path: spec/template/spec/containers[]/name");
    assert_eq!(spec.locate(&res)?, spec.locate(&res)?);
    Ok(())
}

#[test]
fn literal_index_selects_one_element() -> anyhow::Result<()> {
    let res = resource(DEPLOYMENT);
    let spec = spec("path: spec/template/spec/containers/1/name");
    let locations = spec.locate(&res)?;
    assert_eq!(locations.len(), 1);
    assert_eq!(
        res.root().get_path(locations[0].steps()).and_then(Node::as_str),
        Some("sidecar")
    );
    Ok(())
}

#[test]
fn kind_filter_applies_before_traversal() -> anyhow::Result<()> {
    let res = resource(DEPLOYMENT);
    // The path would be a type mismatch on this resource, but the kind never matches.
    let spec = spec("path: metadata/name/oops\nkind: Service");
    assert!(spec.locate(&res)?.is_empty());
    Ok(())
}

#[test]
fn absent_fields_are_not_created_without_create() -> anyhow::Result<()> {
    let mut res = resource(DEPLOYMENT);
    let before = res.clone();
    let spec = spec("path: metadata/namespace");
    let mut visited = 0;
    spec.apply(&mut res, CreateKind::Scalar(Tag::Str), &mut |_| {
        visited += 1;
        Ok(())
    })?;
    assert_eq!(visited, 0);
    assert_eq!(res, before);
    Ok(())
}

#[test]
fn create_builds_intermediate_mappings() -> anyhow::Result<()> {
    let mut res = resource("apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n");
    let spec = spec("path: metadata/labels\ncreate: true");
    spec.apply(&mut res, CreateKind::Mapping, &mut |field| {
        field.node.set("app", Node::string("web"), None)?;
        Ok(())
    })?;
    assert_eq!(
        res.root().get("metadata").and_then(|m| m.get("labels")),
        Some(&Node::from_iter([("app", "web")]))
    );
    Ok(())
}

#[test]
fn create_never_adds_sequence_elements() -> anyhow::Result<()> {
    let mut res = resource("apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\nspec: {}\n");
    let spec = spec("path: spec/containers[]/image\ncreate: true");
    let mut visited = 0;
    spec.apply(&mut res, CreateKind::Scalar(Tag::Str), &mut |_| {
        visited += 1;
        Ok(())
    })?;
    assert_eq!(visited, 0);
    assert_eq!(res.root().get("spec"), Some(&Node::mapping()));
    Ok(())
}

#[test]
fn parse_dotted_paths() -> anyhow::Result<()> {
    let path = FieldPath::parse_dotted("spec.template.spec.containers.[name=app].image")?;
    assert_eq!(
        &path[3..],
        [
            FieldPathSegment::Field("containers".into()),
            FieldPathSegment::Match {
                key: "name".into(),
                value: "app".into()
            },
            FieldPathSegment::Field("image".into()),
        ]
    );

    let path = FieldPath::parse_dotted("metadata.annotations.[example.com/owner]")?;
    assert_eq!(path[2], FieldPathSegment::Field("example.com/owner".into()));
    assert_eq!(FieldPath::parse_dotted("spec.ports.*.port")?[2], FieldPathSegment::Elements);
    assert_eq!(FieldPath::parse_dotted("spec.ports.0.port")?.to_string(), "spec/ports/0/port");

    assert!(FieldPath::parse_dotted("").is_err());
    assert!(FieldPath::parse_dotted("spec..name").is_err());
    assert!(FieldPath::parse_dotted("spec.[name=app").is_err());
    Ok(())
}

#[test]
fn match_segments_select_elements_by_key() -> anyhow::Result<()> {
    let res = resource(DEPLOYMENT);
    let sidecar = spec("path: spec/template/spec/containers/[name=sidecar]/image");
    let locations = sidecar.locate(&res)?;
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].to_string(), "spec/template/spec/containers/1/image");

    let missing = spec("path: spec/template/spec/containers/[name=missing]/image");
    assert!(missing.locate(&res)?.is_empty());
    Ok(())
}

#[test]
fn create_appends_an_element_for_an_unmatched_key() -> anyhow::Result<()> {
    let mut res = resource("apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\nspec: {}\n");
    let spec = spec("path: spec/containers/[name=app]/image\ncreate: true");
    spec.apply(&mut res, CreateKind::Scalar(Tag::Null), &mut |field| {
        *field.node = Node::string("nginx");
        Ok(())
    })?;
    let containers = res.root().get_path(&["spec", "containers"].map(PathStep::from));
    assert_eq!(
        containers,
        Some(&Node::Sequence(vec![Node::from_iter([("name", "app"), ("image", "nginx")])]))
    );
    Ok(())
}

#[test]
fn traversal_through_scalar_is_type_mismatch() {
    let mut res = resource("apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\nspec: oops\n");
    let spec = spec("path: spec/containers[]/image");
    let err = spec
        .apply(&mut res, CreateKind::Scalar(Tag::Str), &mut |_| Ok(()))
        .unwrap_err();
    assert!(err.is_type_mismatch(), "{err}");
    assert!(err.to_string().contains("spec/containers"), "{err}");
}

#[test]
fn type_mismatch_is_skipped_unless_strict() -> anyhow::Result<()> {
    let yaml = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: p\n  labels: oops\nspec:\n  x: 1\n";
    let specs: FieldSpecs = serde_yaml::from_str(
        "- path: metadata/labels/app\n  create: true\n- path: spec/y\n  create: true\n",
    )?;

    let mut res = resource(yaml);
    let mut visited = vec![];
    specs.apply(&mut res, CreateKind::Scalar(Tag::Str), false, |field| {
        visited.push(field.location.to_string());
        Ok(())
    })?;
    assert_eq!(visited, ["spec/y"]);

    let mut res = resource(yaml);
    let err = specs
        .apply(&mut res, CreateKind::Scalar(Tag::Str), true, |_| Ok(()))
        .unwrap_err();
    assert!(err.is_type_mismatch(), "{err}");
    Ok(())
}

#[test]
fn later_specs_win_on_the_same_location() -> anyhow::Result<()> {
    let mut res = resource(DEPLOYMENT);
    let specs: FieldSpecs = serde_yaml::from_str(
        "- path: metadata/name\n- path: metadata/name\n  kind: Deployment\n",
    )?;
    assert_eq!(specs.len(), 2);

    let mut n = 0;
    specs.apply(&mut res, CreateKind::Scalar(Tag::Str), false, |field| {
        n += 1;
        field.node.set_scalar(format!("web-{n}"), Tag::Str)?;
        Ok(())
    })?;
    assert_eq!(res.root().get("metadata").and_then(|m| m.get_str("name")), Some("web-2"));
    Ok(())
}

#[test]
fn merged_replaces_identical_specs() -> anyhow::Result<()> {
    let base: FieldSpecs = serde_yaml::from_str("- path: spec/replicas\n  kind: Deployment\n")?;
    let overrides: FieldSpecs = serde_yaml::from_str(
        "- path: spec/replicas\n  kind: Deployment\n  create: true\n- path: spec/replicas\n  kind: MyKind\n",
    )?;
    let merged = base.merged(&overrides);
    assert_eq!(merged.len(), 2);
    assert!(merged[0].create);
    assert_eq!(merged[1].matcher, GvkMatcher::kind("MyKind"));
    Ok(())
}

#[test]
fn tracker_fires_once_per_effective_write() -> anyhow::Result<()> {
    let mut res = resource(DEPLOYMENT);
    let spec = spec("path: spec/template/spec/containers[]/image");
    let mut writes = vec![];
    let mut tracker = |write: &FieldWrite<'_>| {
        writes.push((write.location.to_string(), write.value.to_string()));
    };

    spec.apply(&mut res, CreateKind::Scalar(Tag::Str), &mut |field| {
        let value = if field.node.as_str() == Some("envoy") { "envoy" } else { "nginx:1.26" };
        set_scalar(field, value, Tag::Str, &mut tracker)?;
        Ok(())
    })?;

    assert_eq!(
        writes,
        [("spec/template/spec/containers/0/image".to_string(), "nginx:1.26".to_string())]
    );
    Ok(())
}

#[test]
fn set_scalar_refuses_collections() {
    let mut node = Node::mapping();
    let location = Location::root();
    let id = ResId::new(Gvk::new("", "v1", "ConfigMap"), "cm", None);
    let mut tracker = NoopTracker;
    let err = set_scalar(
        FieldMut {
            resource: &id,
            location: &location,
            node: &mut node,
        },
        "x",
        Tag::Str,
        &mut tracker,
    )
    .unwrap_err();
    assert!(err.is_type_mismatch(), "{err}");
}
