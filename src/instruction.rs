use std::fmt::Write;

use crate::attribute::{Attribute, Category};

/// Builds the system instruction that asks the model to turn a shopping
/// request into a catalog URL for `category`.
///
/// Only the vocabulary of `category` (plus shared attributes) is listed. For
/// `Category::All` every vertical is listed in its own block.
pub(crate) fn compose(category: Category, host: &str) -> String {
    let mut out = format!(
        "You are the shopping assistant of {host}. Only answer questions about products sold on {host}.\n\n"
    );

    if category == Category::All {
        out.push_str("The store has these categories and attributes:\n\n");
        for concrete in Category::CONCRETE {
            vocabulary_block(&mut out, concrete);
        }
    } else {
        out.push_str("The shopper is looking in this category:\n\n");
        vocabulary_block(&mut out, category);
    }

    let slug = if category == Category::All {
        "<category>"
    } else {
        category.slug()
    };
    let _ = write!(
        out,
        "Rules:\n\
        - Read every word of the request and map it to the closest attribute value above, \
        using synonyms and context. For example an apple colour can mean red or green, \
        and a fabric we do not sell should map to the nearest fabric we do.\n\
        - Use only the category, attribute names and attribute values listed above. \
        Never invent new ones and never borrow attributes from another category.\n\
        - When several values of one attribute match, join them with commas.\n\
        - Answer with the filter as a URL of the form \
        https://{host}/{slug}-online/?attribute1=value1,value2&attribute2=value3\n\
        - On the next line, justify the match in one sentence.\n"
    );
    out
}

fn vocabulary_block(out: &mut String, category: Category) {
    let _ = writeln!(out, "category = {}", category.slug());
    for attr in category.vocabulary() {
        attribute_line(out, attr);
    }
    out.push('\n');
}

fn attribute_line(out: &mut String, attr: &Attribute) {
    let _ = writeln!(out, "{}={}", attr.name, attr.values.join(","));
}
