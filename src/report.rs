use crate::{actions::ShoppingItem, constants::SHOPPING_LIST_TITLE};

/// Plain-text shopping list: a title line, then `name - amount - unit` per item.
pub fn render_shopping_list(items: &[ShoppingItem]) -> String {
    let mut document = format!("{SHOPPING_LIST_TITLE}\n\n");

    if items.is_empty() {
        document.push_str("Your shopping cart is empty.\n");
        return document;
    }

    for item in items {
        document.push_str(&format!(
            "{} - {} - {}\n",
            item.name, item.amount, item.measurement_unit
        ));
    }

    document
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_line_per_item() {
        let items = vec![
            ShoppingItem {
                name: "Sugar".into(),
                measurement_unit: "grams".into(),
                amount: 150,
            },
            ShoppingItem {
                name: "Egg".into(),
                measurement_unit: "pcs".into(),
                amount: 3,
            },
        ];

        assert_eq!(
            render_shopping_list(&items),
            "Shopping list\n\nSugar - 150 - grams\nEgg - 3 - pcs\n"
        );
    }

    #[test]
    fn empty_cart_still_renders() {
        let document = render_shopping_list(&[]);

        assert!(document.starts_with(SHOPPING_LIST_TITLE));
        assert!(document.contains("empty"));
    }
}
