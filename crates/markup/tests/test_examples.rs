use helios_markup::{
    Registry, Result, Settings, XmlType, from_xml_str, from_xml_str_with, to_xml_string,
    to_xml_string_with,
};

#[derive(Debug, Default, Clone, PartialEq, XmlType)]
struct Point {
    #[xml(rename = "X")]
    x: i32,
    #[xml(rename = "Y")]
    y: i32,
}

#[derive(Debug, Default, PartialEq, XmlType)]
#[xml(rename_all = "PascalCase")]
struct Customer {
    name: String,
}

#[derive(Debug, Default, PartialEq, XmlType)]
#[xml(rename_all = "PascalCase")]
struct OrderLine {
    sku: String,
    quantity: u32,
}

#[derive(Debug, Default, PartialEq, XmlType)]
#[xml(namespace = "urn:shop", rename_all = "PascalCase")]
struct Order {
    id: u32,
    customer: Option<Customer>,
    #[xml(item = "Line")]
    lines: Vec<OrderLine>,
}

fn sample_order() -> Order {
    Order {
        id: 7,
        customer: Some(Customer {
            name: "Ann".to_string(),
        }),
        lines: vec![
            OrderLine {
                sku: "A-1".to_string(),
                quantity: 2,
            },
            OrderLine {
                sku: "B-2".to_string(),
                quantity: 1,
            },
        ],
    }
}

#[test]
fn test_points_worked_example() -> Result<()> {
    let points = vec![
        Point { x: 1, y: 2 },
        Point { x: 3, y: 4 },
        Point { x: 5, y: 6 },
    ];

    let xml = to_xml_string(&points)?;
    assert_eq!(
        xml,
        r#"<Points><Point X="1" Y="2"/><Point X="3" Y="4"/><Point X="5" Y="6"/></Points>"#
    );

    let back: Vec<Point> = from_xml_str(&xml)?;
    assert_eq!(back, points);
    Ok(())
}

#[test]
fn test_nested_order() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();
    let order = sample_order();

    let xml = to_xml_string_with(&order, &registry, &settings)?;
    assert_eq!(
        xml,
        concat!(
            r#"<Order xmlns="urn:shop" Id="7">"#,
            r#"<Customer Name="Ann"/>"#,
            r#"<Lines><Line Sku="A-1" Quantity="2"/><Line Sku="B-2" Quantity="1"/></Lines>"#,
            "</Order>"
        )
    );

    let back: Order = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, order);
    Ok(())
}

#[test]
fn test_indented_output_reads_back() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default()
        .with_indent(2)
        .with_xml_declaration(true);
    let order = sample_order();

    let xml = to_xml_string_with(&order, &registry, &settings)?;
    println!("XML output (indented):\n{}", xml);
    assert!(xml.starts_with("<?xml"));
    assert!(xml.contains("\n  <Customer Name=\"Ann\"/>"));

    let back: Order = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, order);
    Ok(())
}

#[test]
fn test_absent_member_round_trips_as_nil() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();
    let order = Order {
        id: 1,
        ..Order::default()
    };

    let xml = to_xml_string_with(&order, &registry, &settings)?;
    assert!(xml.contains(r#"<Customer xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:nil="true"/>"#));
    assert!(xml.contains("<Lines/>"));

    let back: Order = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, order);
    Ok(())
}

#[test]
fn test_members_read_in_any_order() -> Result<()> {
    let registry = Registry::new();
    let xml = concat!(
        r#"<Order xmlns="urn:shop" Id="7">"#,
        "<!-- lines first -->",
        r#"<Lines><Line Sku="A-1" Quantity="2"/><Line Sku="B-2" Quantity="1"/></Lines>"#,
        r#"<Customer Name="Ann"/>"#,
        "</Order>"
    );
    let order: Order = from_xml_str_with(xml, &registry, &Settings::default())?;
    assert_eq!(order, sample_order());
    Ok(())
}

#[derive(Debug, Default, PartialEq, XmlType)]
#[xml(rename_all = "PascalCase")]
struct Invoice {
    number: uuid::Uuid,
    amount: rust_decimal::Decimal,
    issued: Option<chrono::DateTime<chrono::Utc>>,
    #[xml(converter = "base64")]
    signature: Vec<u8>,
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("helios_markup=debug"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(filter)
        .try_init();
}

#[test]
fn test_decimal_temporal_and_binary_members() -> Result<()> {
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    init_logging();
    let registry = Registry::new();
    let settings = Settings::default();
    let invoice = Invoice {
        number: uuid::Uuid::nil(),
        amount: dec!(12.50),
        issued: chrono::Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).single(),
        signature: vec![0xde, 0xad, 0xbe, 0xef],
    };

    let xml = to_xml_string_with(&invoice, &registry, &settings)?;
    assert!(xml.contains(r#"Amount="12.50""#));
    assert!(xml.contains(r#"Number="00000000-0000-0000-0000-000000000000""#));
    assert!(xml.contains(r#"Signature="3q2+7w==""#));

    let back: Invoice = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back, invoice);
    Ok(())
}
