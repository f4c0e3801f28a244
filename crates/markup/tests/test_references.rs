use std::sync::Arc;

use helios_markup::{
    ConfigError, Registry, Result, Settings, XmlDeserializer, XmlType, cursor::QuickXmlReader,
    from_xml_str_with, to_xml_string_with,
};

#[derive(Debug, Default, PartialEq, XmlType)]
#[xml(key = "code")]
struct Currency {
    code: String,
    name: String,
}

#[derive(Debug, Default, XmlType)]
struct Ledger {
    currencies: Vec<Arc<Currency>>,
    #[xml(reference, element)]
    base: Option<Arc<Currency>>,
}

#[derive(Debug, Default, XmlType)]
struct EagerLedger {
    #[xml(reference)]
    base: Option<Arc<Currency>>,
    currencies: Vec<Arc<Currency>>,
}

#[derive(Debug, Default, XmlType)]
struct Exchange {
    currencies: Vec<Arc<Currency>>,
    #[xml(reference)]
    accepted: Vec<Arc<Currency>>,
}

#[derive(Debug, Default, XmlType)]
struct Broken {
    #[xml(reference)]
    base: Option<Currency>,
}

fn currency(code: &str, name: &str) -> Arc<Currency> {
    Arc::new(Currency {
        code: code.to_string(),
        name: name.to_string(),
    })
}

#[test]
fn test_reference_is_written_as_key() -> Result<()> {
    let euro = currency("EUR", "Euro");
    let ledger = Ledger {
        currencies: vec![currency("USD", "Dollar"), euro.clone()],
        base: Some(euro),
    };

    let xml = to_xml_string_with(&ledger, &Registry::new(), &Settings::default())?;
    assert_eq!(
        xml,
        concat!(
            "<Ledger><currencies>",
            r#"<Currency code="USD" name="Dollar"/><Currency code="EUR" name="Euro"/>"#,
            "</currencies><base>EUR</base></Ledger>"
        )
    );
    Ok(())
}

#[test]
fn test_reference_resolves_to_shared_instance() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();
    let euro = currency("EUR", "Euro");
    let ledger = Ledger {
        currencies: vec![currency("USD", "Dollar"), euro.clone()],
        base: Some(euro),
    };
    let xml = to_xml_string_with(&ledger, &registry, &settings)?;

    let mut deserializer = XmlDeserializer::new(QuickXmlReader::from_str(&xml), &registry, settings);
    let back: Ledger = deserializer.deserialize()?;
    assert_eq!(deserializer.references().len(), 2);

    let base = back.base.expect("base currency");
    assert!(Arc::ptr_eq(&base, &back.currencies[1]));
    assert_eq!(base.name, "Euro");
    Ok(())
}

#[test]
fn test_forward_reference_is_left_unset() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();
    let euro = currency("EUR", "Euro");
    let ledger = EagerLedger {
        base: Some(euro.clone()),
        currencies: vec![euro],
    };

    let xml = to_xml_string_with(&ledger, &registry, &settings)?;
    assert!(xml.starts_with(r#"<EagerLedger base="EUR">"#));

    let back: EagerLedger = from_xml_str_with(&xml, &registry, &settings)?;
    assert!(back.base.is_none());
    assert_eq!(back.currencies.len(), 1);
    Ok(())
}

#[test]
fn test_reference_needs_shared_type() {
    let err = Registry::new().register::<Broken>().unwrap_err();
    assert!(matches!(err, ConfigError::ReferenceNotShared { ref member, .. } if member == "base"));
}

#[test]
fn test_reference_list_holds_keys() -> Result<()> {
    let registry = Registry::new();
    let settings = Settings::default();
    let dollar = currency("USD", "Dollar");
    let euro = currency("EUR", "Euro");
    let exchange = Exchange {
        currencies: vec![dollar.clone(), euro.clone()],
        accepted: vec![euro, dollar],
    };

    let xml = to_xml_string_with(&exchange, &registry, &settings)?;
    assert!(xml.ends_with(
        "<accepted><Currency>EUR</Currency><Currency>USD</Currency></accepted></Exchange>"
    ));

    let back: Exchange = from_xml_str_with(&xml, &registry, &settings)?;
    assert_eq!(back.accepted.len(), 2);
    assert!(Arc::ptr_eq(&back.accepted[0], &back.currencies[1]));
    assert!(Arc::ptr_eq(&back.accepted[1], &back.currencies[0]));
    Ok(())
}

#[test]
fn test_unresolved_list_keys_are_skipped() -> Result<()> {
    let xml = concat!(
        "<Exchange><currencies>",
        r#"<Currency code="USD" name="Dollar"/>"#,
        "</currencies><accepted>",
        "<Currency>GBP</Currency><Currency>USD</Currency>",
        "</accepted></Exchange>"
    );
    let back: Exchange = from_xml_str_with(xml, &Registry::new(), &Settings::default())?;
    assert_eq!(back.accepted.len(), 1);
    assert_eq!(back.accepted[0].code, "USD");
    Ok(())
}
