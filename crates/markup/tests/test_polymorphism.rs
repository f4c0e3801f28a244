use std::any::Any;
use std::fmt::Debug;

use helios_markup::registry::Shape;
use helios_markup::{
    FormatErrorKind, Registry, Result, Settings, TypeBuilder, XmlType, from_xml_str_with,
    to_xml_string_with,
};

#[derive(Debug, Default, Clone, PartialEq, XmlType)]
struct Circle {
    radius: f64,
}

#[derive(Debug, Default, Clone, PartialEq, XmlType)]
struct Square {
    side: f64,
}

#[derive(Debug, Clone, PartialEq, XmlType)]
enum Figure {
    Circle(Circle),
    Square(Square),
}

#[derive(Debug, Default, PartialEq, XmlType)]
struct Drawing {
    main: Option<Figure>,
    figures: Vec<Figure>,
}

trait Animal: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Default, PartialEq, XmlType)]
struct Dog {
    name: String,
}

#[derive(Debug, Default, PartialEq, XmlType)]
struct Cat {
    name: String,
    lives: u8,
}

impl Animal for Dog {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Animal for Cat {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl XmlType for Box<dyn Animal> {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.name("Animal")
            .subtype::<Dog>(|dog| Box::new(dog) as Box<dyn Animal>)
            .subtype::<Cat>(|cat| Box::new(cat) as Box<dyn Animal>)
            .view(|animal| animal.as_any());
    }
}

#[derive(Debug, Default, XmlType)]
struct Zoo {
    animals: Vec<Box<dyn Animal>>,
}

fn sample_drawing() -> Drawing {
    Drawing {
        main: Some(Figure::Circle(Circle { radius: 2.0 })),
        figures: vec![
            Figure::Square(Square { side: 1.5 }),
            Figure::Circle(Circle { radius: 0.5 }),
        ],
    }
}

#[test]
fn test_enum_subtypes_are_polymorphic() -> Result<()> {
    let registry = Registry::new();
    let descriptor = registry.register::<Figure>()?;
    assert_eq!(descriptor.shape(), Shape::Polymorphic);
    assert!(!descriptor.is_sealed());
    assert_eq!(descriptor.subtypes().len(), 2);
    Ok(())
}

#[test]
fn test_type_marker_round_trip() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();
    let drawing = sample_drawing();

    let xml = to_xml_string_with(&drawing, &registry, &settings)?;
    assert_eq!(
        xml,
        concat!(
            "<Drawing>",
            r#"<main xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:type="Circle" radius="2"/>"#,
            r#"<figures><Square side="1.5"/><Circle radius="0.5"/></figures>"#,
            "</Drawing>"
        )
    );

    let back: Drawing = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, drawing);
    Ok(())
}

#[test]
fn test_markers_can_be_turned_off() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings {
        emit_type_markers: false,
        ..Settings::default()
    };
    let xml = to_xml_string_with(&sample_drawing(), &registry, &settings)?;
    assert!(xml.starts_with(r#"<Drawing><main radius="2"/>"#));
    Ok(())
}

#[test]
fn test_root_resolves_to_subtype() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();

    let square = Figure::Square(Square { side: 3.0 });
    let xml = to_xml_string_with(&square, &registry, &settings)?;
    assert_eq!(xml, r#"<Square side="3"/>"#);

    let back: Figure = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, square);
    Ok(())
}

#[test]
fn test_unknown_marker_is_a_type_mismatch() {
    let registry = Registry::new();
    let xml = concat!(
        r#"<Drawing xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance">"#,
        r#"<main xsi:type="Triangle"/>"#,
        "</Drawing>"
    );
    let err = from_xml_str_with::<Drawing>(xml, &registry, &Settings::default()).unwrap_err();
    let format = err.as_format().expect("format error");
    assert!(matches!(format.kind, FormatErrorKind::TypeMismatch { .. }));
}

#[test]
fn test_trait_object_subtypes() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();
    let zoo = Zoo {
        animals: vec![
            Box::new(Dog {
                name: "Rex".to_string(),
            }),
            Box::new(Cat {
                name: "Tom".to_string(),
                lives: 9,
            }),
        ],
    };

    let xml = to_xml_string_with(&zoo, &registry, &settings)?;
    assert_eq!(
        xml,
        r#"<Zoo><animals><Dog name="Rex"/><Cat name="Tom" lives="9"/></animals></Zoo>"#
    );

    let back: Zoo = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back.animals.len(), 2);
    assert_eq!(
        back.animals[0].as_any().downcast_ref::<Dog>(),
        Some(&Dog {
            name: "Rex".to_string()
        })
    );
    assert_eq!(
        back.animals[1].as_any().downcast_ref::<Cat>(),
        Some(&Cat {
            name: "Tom".to_string(),
            lives: 9
        })
    );
    Ok(())
}
