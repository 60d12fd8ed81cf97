use specnorm_core::{ContentKind, RawValue};
use specnorm_ingest_docs::extract_document;

const PRODUCT_PAGE: &str = r#"<html><body>
<h1>LBX Series</h1>
<table>
  <tr><th>Specification</th><th>Value</th></tr>
  <tr><td>Wavelength (nm) 1</td><td>488 ± 2</td></tr>
  <tr><td>Output Power*</td><td>100 mW</td></tr>
  <tr><td>PER</td><td>&gt;100:1</td></tr>
</table>
<table>
  <tr><th></th><th></th><th></th></tr>
  <tr><td>broken</td><td></td><td></td></tr>
</table>
<table>
  <tr><th>Parameter</th><th>Value</th></tr>
  <tr><td>Output Power</td><td>120 mW</td></tr>
</table>
</body></html>"#;

#[test]
fn markup_tables_union_with_later_override() {
    let extraction = extract_document(ContentKind::Markup, PRODUCT_PAGE.as_bytes());
    let specs = &extraction.raw_specs;

    let wavelength = specs.get("wavelength").expect("wavelength");
    assert_eq!(wavelength.original_key, "Wavelength (nm) 1");
    assert_eq!(wavelength.value, RawValue::from("488 ± 2"));
    assert_eq!(
        specs.get("output power").unwrap().value,
        RawValue::from("120 mW")
    );
    assert_eq!(specs.get("per").unwrap().value, RawValue::from(">100:1"));
    assert_eq!(extraction.warnings.len(), 1);
    assert!(extraction.text.contains("LBX Series"));
}

#[test]
fn footnote_cell_past_header_keeps_the_rest_of_the_table() {
    let html = r#"<table>
  <tr><th>Parameter</th><th>Value</th></tr>
  <tr><td>Wavelength</td><td>488 nm</td></tr>
  <tr><td>Output power</td><td>100 mW</td></tr>
  <tr><td>Beam diameter</td><td>0.7 mm</td><td>1)</td></tr>
</table>"#;
    let extraction = extract_document(ContentKind::Markup, html.as_bytes());
    let keys: Vec<&str> = extraction.raw_specs.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["beam diameter", "output power", "wavelength"]);
    assert_eq!(
        extraction.raw_specs.get("beam diameter").unwrap().value,
        RawValue::from("0.7 mm")
    );
    assert_eq!(extraction.warnings.len(), 1);
    assert!(extraction.warnings[0].starts_with("table 0: row"));
}

#[test]
fn markup_without_tables_falls_back_to_text_pairs() {
    let html = "<html><body><p>Wavelength: 405 nm</p><p>Polarization ratio: >100:1</p></body></html>";
    let extraction = extract_document(ContentKind::Markup, html.as_bytes());
    assert_eq!(extraction.raw_specs.len(), 2);
    assert_eq!(
        extraction
            .raw_specs
            .get("polarization ratio")
            .unwrap()
            .value,
        RawValue::from(">100:1")
    );
}

#[test]
fn document_text_with_family_blob_yields_models() {
    let text = "\
LuxX+ family
Models: LuxX+ 405-100 405 nm / 100 mW LuxX+ 488-50 488 nm / 50 mW
| Parameter | Value |
|---|---|
| Warm-up time | < 5 min |
";
    let extraction = extract_document(ContentKind::DocumentText, text.as_bytes());
    assert_eq!(extraction.models.len(), 2);
    assert_eq!(
        extraction.models["LuxX+ 488-50"]
            .get("wavelength")
            .unwrap()
            .value,
        RawValue::from("488 nm")
    );
    assert_eq!(
        extraction.raw_specs.get("warm-up time").unwrap().value,
        RawValue::from("< 5 min")
    );
}

#[test]
fn extraction_is_deterministic() {
    let a = extract_document(ContentKind::Markup, PRODUCT_PAGE.as_bytes());
    let b = extract_document(ContentKind::Markup, PRODUCT_PAGE.as_bytes());
    assert_eq!(a, b);
}
