use super::types::MealType;

/// One "today's meal" slot exposed as a sensor and an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MealEntityDescription {
    pub meal: MealType,
    pub key: &'static str,
    pub name: &'static str,
}

pub const TODAYS_MEALS: [MealEntityDescription; 4] = [
    MealEntityDescription {
        meal: MealType::Breakfast,
        key: "todays_breakfast",
        name: "Today's breakfast",
    },
    MealEntityDescription {
        meal: MealType::Lunch,
        key: "todays_lunch",
        name: "Today's lunch",
    },
    MealEntityDescription {
        meal: MealType::Dinner,
        key: "todays_dinner",
        name: "Today's dinner",
    },
    MealEntityDescription {
        meal: MealType::Side,
        key: "todays_side",
        name: "Today's side",
    },
];

/// Transliterate `name` to lowercase ASCII, joining its words with underscores
pub fn slugify(name: &str) -> String {
    slug::slugify(name).replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Groceries"), "groceries");
        assert_eq!(slugify("Weekly  Shop (Aldi)"), "weekly_shop_aldi");
        assert_eq!(slugify("  --Hardware--  "), "hardware");
        assert_eq!(slugify("Crème brûlée"), "creme_brulee");
        assert_eq!(slugify("Einkäufe"), "einkaufe");
        assert_eq!(slugify("!!!"), "");
    }

    #[test]
    fn test_table_covers_every_slot() {
        let meals: Vec<_> = TODAYS_MEALS.iter().map(|d| d.meal).collect();
        assert_eq!(meals, MealType::ALL);
    }
}
