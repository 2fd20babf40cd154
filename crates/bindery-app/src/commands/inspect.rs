// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `bindery inspect`: page count, page sizes and embedded page images.

use std::path::Path;

use anyhow::{Context, Result};
use bindery_document::PdfReader;

pub fn run(pdf: &Path) -> Result<()> {
    let reader = PdfReader::open(pdf).with_context(|| format!("cannot inspect {}", pdf.display()))?;

    println!("{}: {} page(s)", pdf.display(), reader.page_count());
    if let Some(producer) = reader.info("Producer") {
        println!("producer: {producer}");
    }
    if let Some(title) = reader.info("Title") {
        println!("title: {title}");
    }

    let sizes = reader.page_sizes()?;
    let images = reader.page_images().unwrap_or_default();
    for (i, size) in sizes.iter().enumerate() {
        let image = images
            .get(i)
            .map(|img| {
                format!(
                    "  image {}x{} {}",
                    img.width,
                    img.height,
                    img.filter.as_deref().unwrap_or("raw")
                )
            })
            .unwrap_or_default();
        println!("page {}: {} x {} pt{image}", i + 1, size.width, size.height);
    }
    Ok(())
}
