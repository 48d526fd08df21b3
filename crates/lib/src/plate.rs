//! Licence plate readings parsed out of free-text model answers.
//!
//! Image answers use labeled lines (`เลขทะเบียน: ...` / `จังหวัด: ...`); frame answers use
//! `<plate>,<province>`. Both parsers return `None` rather than empty strings when the
//! answer holds no usable reading.

/// Label of the plate-number line in image answers.
pub const PLATE_LABEL: &str = "เลขทะเบียน";
/// Label of the province line in image answers.
pub const PROVINCE_LABEL: &str = "จังหวัด";
/// Answer for an unreadable field.
pub const UNCLEAR: &str = "ไม่ชัดเจน";
/// Answer for a frame with no plate.
pub const NOT_FOUND: &str = "ไม่พบ";

/// A plate number and its province.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlateReading {
    pub plate_number: String,
    pub province: String,
}

impl PlateReading {
    /// Display form used in summaries and reports, e.g. `กข 1234 (จ. ขอนแก่น)`.
    pub fn label(&self) -> String {
        format!("{} (จ. {})", self.plate_number, self.province)
    }
}

/// Value of the first line containing `label` followed by a colon, with surrounding
/// whitespace and markdown emphasis removed. `None` if the label is missing or the value
/// is empty.
pub fn labeled_field<'a>(text: &'a str, label: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let start = line.find(label)? + label.len();
        let rest = line[start..].trim_start_matches(['*', ' ']);
        let rest = rest
            .strip_prefix(':')
            .or_else(|| rest.strip_prefix('：'))?;
        let value = rest.trim_matches(|c: char| c.is_whitespace() || matches!(c, '*' | '[' | ']'));
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn usable(value: &str) -> bool {
    !value.is_empty() && value != UNCLEAR && value != NOT_FOUND
}

/// Reading from a labeled image answer; `None` unless both fields are present and legible.
pub fn parse_labeled_reading(text: &str) -> Option<PlateReading> {
    let plate = labeled_field(text, PLATE_LABEL)?;
    let province = labeled_field(text, PROVINCE_LABEL)?;
    if !usable(plate) || !usable(province) {
        return None;
    }
    Some(PlateReading {
        plate_number: plate.to_string(),
        province: province.to_string(),
    })
}

/// Reading from a `<plate>,<province>` frame answer; `None` for `ไม่พบ` or anything else
/// without two non-empty parts.
pub fn parse_frame_answer(text: &str) -> Option<PlateReading> {
    let line = text.trim().lines().next()?.trim();
    if line == NOT_FOUND {
        return None;
    }
    let (plate, province) = line.split_once(',')?;
    let plate = plate.trim().trim_matches(['[', ']']).trim();
    let province = province.trim().trim_matches(['[', ']']).trim();
    if !usable(plate) || !usable(province) {
        return None;
    }
    Some(PlateReading {
        plate_number: plate.to_string(),
        province: province.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labeled_answer_is_parsed() {
        let answer = "เลขทะเบียน: กข 1234\nจังหวัด: กรุงเทพมหานคร";
        assert_eq!(
            parse_labeled_reading(answer),
            Some(PlateReading {
                plate_number: "กข 1234".to_string(),
                province: "กรุงเทพมหานคร".to_string(),
            })
        );
    }

    #[test]
    fn markdown_and_preamble_are_tolerated() {
        let answer = "ผลการอ่าน\n**เลขทะเบียน:** 1กก 999\n* **จังหวัด:** [เชียงใหม่]\n";
        let r = parse_labeled_reading(answer).unwrap();
        assert_eq!(r.plate_number, "1กก 999");
        assert_eq!(r.province, "เชียงใหม่");
        assert_eq!(r.label(), "1กก 999 (จ. เชียงใหม่)");
    }

    #[test]
    fn missing_label_is_none_not_empty() {
        assert_eq!(labeled_field("จังหวัด: ภูเก็ต", PLATE_LABEL), None);
        assert_eq!(labeled_field("เลขทะเบียน:   ", PLATE_LABEL), None);
        assert_eq!(labeled_field("เลขทะเบียน กข 1", PLATE_LABEL), None);
        assert_eq!(parse_labeled_reading("ไม่ชัดเจน"), None);
    }

    #[test]
    fn unclear_fields_are_rejected() {
        assert_eq!(
            parse_labeled_reading("เลขทะเบียน: ไม่ชัดเจน\nจังหวัด: ไม่ชัดเจน"),
            None
        );
        assert_eq!(
            parse_labeled_reading("เลขทะเบียน: กข 1234\nจังหวัด: ไม่ชัดเจน"),
            None
        );
    }

    #[test]
    fn full_width_colon_is_accepted() {
        assert_eq!(labeled_field("จังหวัด： ระยอง", PROVINCE_LABEL), Some("ระยอง"));
    }

    #[test]
    fn frame_answers() {
        assert_eq!(
            parse_frame_answer(" กข 1234, ขอนแก่น \n"),
            Some(PlateReading {
                plate_number: "กข 1234".to_string(),
                province: "ขอนแก่น".to_string(),
            })
        );
        assert_eq!(parse_frame_answer("[1กข 55],[ชลบุรี]").unwrap().province, "ชลบุรี");
        assert_eq!(parse_frame_answer("ไม่พบ"), None);
        assert_eq!(parse_frame_answer("no comma here"), None);
        assert_eq!(parse_frame_answer("กข 1234,"), None);
        assert_eq!(parse_frame_answer(""), None);
    }
}
