#![allow(dead_code)]

use fatture_core::{CatalogEntry, CatalogYear};
use fatture_catalog::Catalog;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use rust_decimal::Decimal;

pub fn cents(units: i64) -> Decimal {
    Decimal::new(units, 2)
}

/// The two-product list most scenarios run against.
pub fn olio_catalog() -> Catalog {
    let year = CatalogYear(2026);
    Catalog::from_entries(
        year,
        "prezzi_vainieri_2026.xlsx",
        vec![
            CatalogEntry::new("A100", "Olio 1L", cents(500), year),
            CatalogEntry::new("B200", "Aceto balsamico", cents(320), year),
        ],
    )
}

/// A PDF with `(x, y, text)` items per page, Helvetica 10.
pub fn pdf(pages: &[Vec<(i64, i64, &str)>]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for items in pages {
        let operations: Vec<Operation> = items
            .iter()
            .flat_map(|(x, y, text)| {
                [
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 10.into()]),
                    Operation::new("Td", vec![(*x).into(), (*y).into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ]
            })
            .collect();
        let content = Content { operations };
        let stream = Stream::new(dictionary! {}, content.encode().unwrap());
        let content_id = doc.add_object(stream);
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Header and rows laid out in fixed columns from `y` downwards.
pub fn table(y: i64, rows: &[[&'static str; 5]]) -> Vec<(i64, i64, &'static str)> {
    const X: [i64; 5] = [50, 120, 330, 400, 480];
    let header = ["Codice", "Descrizione", "Qta", "Prezzo", "Importo"];
    std::iter::once(header)
        .chain(rows.iter().copied())
        .enumerate()
        .flat_map(|(i, row)| {
            let line_y = y - 14 * i as i64;
            X.iter()
                .zip(row)
                .filter(|(_, text)| !text.is_empty())
                .map(move |(x, text)| (*x, line_y, text))
                .collect::<Vec<_>>()
        })
        .collect()
}
