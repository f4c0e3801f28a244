use std::sync::Arc;
use std::thread;

use helios_markup::{
    ConfigError, ConvertError, FnConverter, MemberPolicy, QName, Registry, Result, Settings,
    XmlType, from_xml_str_with, to_xml_string_with,
};

#[derive(Debug, Default, PartialEq, XmlType)]
#[xml(namespace = "http://example.com/catalog/v2")]
struct Widget {
    id: u64,
    #[xml(element)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, PartialEq, XmlType)]
struct Part {
    #[xml(converter = "upper")]
    code: String,
    #[xml(converter = "bool-numeric")]
    spare: bool,
}

#[derive(Debug, Default, XmlType)]
struct Clash {
    #[xml(rename = "value")]
    first: i32,
    #[xml(rename = "value")]
    second: i32,
}

#[derive(Debug, Default, PartialEq, XmlType)]
struct Point {
    x: i32,
    y: i32,
}

fn upper_converter() -> Arc<FnConverter<String>> {
    Arc::new(FnConverter::simple(
        |text| Ok(text.to_lowercase()),
        |value: &String| value.to_uppercase(),
    ))
}

#[test]
fn test_concurrent_registration_yields_one_descriptor() {
    let registry = Registry::new();
    registry.add_converter("upper", upper_converter());

    let descriptors: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.register::<Widget>()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread panicked").expect("registered"))
            .collect()
    });

    let first = &descriptors[0];
    assert!(descriptors.iter().all(|d| Arc::ptr_eq(d, first)));
    assert!(Arc::ptr_eq(first, &registry.lookup::<Widget>().unwrap()));
    assert!(registry.lookup::<Part>().is_some());
}

#[test]
fn test_named_converters() -> Result<()> {
    let registry = Registry::new();
    registry.add_converter("upper", upper_converter());
    let settings = Settings::default();
    let widget = Widget {
        id: 5,
        parts: vec![Part {
            code: "ab-1".to_string(),
            spare: true,
        }],
    };

    let xml = to_xml_string_with(&widget, &registry, &settings)?;
    assert_eq!(
        xml,
        concat!(
            r#"<Widget xmlns="http://example.com/catalog/v2" id="5">"#,
            r#"<parts><Part xmlns="" code="AB-1" spare="1"/></parts>"#,
            "</Widget>"
        )
    );

    let back: Widget = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, widget);
    Ok(())
}

#[test]
fn test_unknown_converter_is_a_config_error() {
    let err = Registry::new().register::<Part>().unwrap_err();
    assert!(matches!(err, ConfigError::UnknownConverter { ref converter, .. } if converter == "upper"));
}

#[test]
fn test_duplicate_tags_fail_and_publish_nothing() {
    let registry = Registry::new();
    let before = registry.catalog().len();
    let err = registry.register::<Clash>().unwrap_err();
    assert!(matches!(err, ConfigError::DuplicateTag { ref tag, .. } if tag == "value"));
    assert!(registry.lookup::<Clash>().is_none());
    assert_eq!(registry.catalog().len(), before);
}

#[test]
fn test_tag_lookup_widens_namespace() -> Result<()> {
    let registry = Registry::new();
    registry.add_converter("upper", upper_converter());
    registry.register::<Widget>()?;

    let exact = QName::with_namespace(Some("http://example.com/catalog/v2"), "Widget");
    let deeper = QName::with_namespace(Some("http://example.com/catalog/v2/extensions"), "Widget");
    let elsewhere = QName::with_namespace(Some("urn:other"), "Widget");
    for tag in [exact, deeper, elsewhere] {
        let found = registry.lookup_by_tag(&tag).expect("resolved");
        assert_eq!(found.type_name(), std::any::type_name::<Widget>());
    }
    Ok(())
}

#[test]
fn test_element_policy() -> Result<()> {
    let registry = Registry::with_policy(MemberPolicy::Elements);
    let settings = Settings::default();
    let xml = to_xml_string_with(&Point { x: 1, y: 2 }, &registry, &settings)?;
    assert_eq!(xml, "<Point><x>1</x><y>2</y></Point>");
    let back: Point = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, Point { x: 1, y: 2 });
    Ok(())
}

#[test]
fn test_auto_registration_can_be_disabled() {
    let settings = Settings::default().with_auto_register(false);
    let err = to_xml_string_with(&Point::default(), &Registry::new(), &settings).unwrap_err();
    assert!(matches!(err.as_config(), Some(ConfigError::Unregistered { .. })));
}

#[test]
fn test_settings_from_json_config() -> Result<()> {
    let config = r#"{ "xml_declaration": true, "root_name": "Origin" }"#;
    let settings: Settings = serde_json::from_str(config).expect("valid settings");
    assert!(settings.escape_text);

    let xml = to_xml_string_with(&Point { x: 1, y: 0 }, &Registry::new(), &settings)?;
    assert_eq!(xml, r#"<?xml version="1.0" encoding="utf-8"?><Origin x="1" y="0"/>"#);
    Ok(())
}

#[test]
fn test_convert_error_message() {
    let err = ConvertError::new("not a number");
    assert_eq!(err.to_string(), "not a number");
}
