use crate::schema::{Layout, LayoutKind, LayoutShape, ProgramSchema};

/// Picks the layout whose discriminator prefixes `data`.
///
/// When a fixed and a variable layout share a discriminator, the fixed one wins only if its
/// declared size equals the buffer length. A fixed layout whose size does not match is still
/// returned when nothing else claims the buffer, so the caller can report the mismatch.
/// Layouts without a discriminator are tried last and only claim buffers of exactly their
/// declared size.
pub fn match_layout<'s>(
    layouts: &'s [Layout],
    discriminator_len: usize,
    data: &[u8],
) -> Option<&'s Layout> {
    data.get(..discriminator_len)
        .and_then(|prefix| match_prefixed(layouts, prefix, data.len()))
        .or_else(|| {
            layouts
                .iter()
                .find(|l| l.is_size_matched() && l.shape == LayoutShape::Fixed(data.len()))
        })
}

fn match_prefixed<'s>(layouts: &'s [Layout], prefix: &[u8], len: usize) -> Option<&'s Layout> {
    let mut variable = None;
    let mut fixed_other = None;
    for layout in layouts.iter().filter(|l| l.discriminator == prefix) {
        match layout.shape {
            LayoutShape::Fixed(expected) if expected == len => return Some(layout),
            LayoutShape::Fixed(_) => {
                fixed_other.get_or_insert(layout);
            }
            LayoutShape::Variable => {
                variable.get_or_insert(layout);
            }
        }
    }
    variable.or(fixed_other)
}

pub fn match_discriminator<'s>(
    schema: &'s ProgramSchema,
    kind: LayoutKind,
    data: &[u8],
) -> Option<&'s Layout> {
    match_layout(schema.layouts(kind), schema.discriminator_len, data)
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "test assertions")]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldSpec};

    fn one(kind: FieldKind) -> Vec<FieldSpec> {
        vec![FieldSpec::new("x", kind)]
    }

    fn schema() -> ProgramSchema {
        ProgramSchema::builder("prog")
            .discriminator_len(2)
            .event(Layout::new("current", &[1, 1], one(FieldKind::String)))
            .event(Layout::new("legacy", &[1, 1], one(FieldKind::U32)).fixed(6))
            .event(Layout::new("only_fixed", &[2, 2], one(FieldKind::U8)).fixed(3))
            .account(Layout::new("raw_state", &[], one(FieldKind::U32)).fixed(4))
            .build()
            .unwrap()
    }

    #[test]
    fn exact_length_selects_fixed_layout() {
        let schema = schema();
        let hit = match_discriminator(&schema, LayoutKind::Event, &[1, 1, 0, 0, 0, 0]).unwrap();
        assert_eq!(hit.name, "legacy");
        let hit = match_discriminator(&schema, LayoutKind::Event, &[1, 1, 0, 0, 0, 0, 9]).unwrap();
        assert_eq!(hit.name, "current");
    }

    #[test]
    fn lone_fixed_layout_is_returned_on_length_mismatch() {
        let schema = schema();
        let hit = match_discriminator(&schema, LayoutKind::Event, &[2, 2, 0, 0]).unwrap();
        assert_eq!(hit.name, "only_fixed");
    }

    #[test]
    fn short_or_unknown_prefix_is_no_match() {
        let schema = schema();
        assert!(match_discriminator(&schema, LayoutKind::Event, &[1]).is_none());
        assert!(match_discriminator(&schema, LayoutKind::Event, &[]).is_none());
        assert!(match_discriminator(&schema, LayoutKind::Event, &[9, 9, 9]).is_none());
        assert!(match_discriminator(&schema, LayoutKind::Instruction, &[1, 1, 0]).is_none());
    }

    #[test]
    fn undiscriminated_layout_claims_only_its_exact_size() {
        let schema = schema();
        let hit = match_discriminator(&schema, LayoutKind::Account, &[7, 0, 0, 0]).unwrap();
        assert_eq!(hit.name, "raw_state");
        assert!(match_discriminator(&schema, LayoutKind::Account, &[7, 0, 0]).is_none());
        assert!(match_discriminator(&schema, LayoutKind::Account, &[7, 0, 0, 0, 0]).is_none());
        assert!(match_discriminator(&schema, LayoutKind::Account, &[]).is_none());
    }

    #[test]
    fn discriminated_layout_wins_over_size_match() {
        let schema = ProgramSchema::builder("prog")
            .discriminator_len(1)
            .account(Layout::new("tagged", &[5], one(FieldKind::U16)))
            .account(Layout::new("raw", &[], one(FieldKind::U16)).fixed(2))
            .build()
            .unwrap();
        let hit = match_discriminator(&schema, LayoutKind::Account, &[5, 1]).unwrap();
        assert_eq!(hit.name, "tagged");
        let hit = match_discriminator(&schema, LayoutKind::Account, &[6, 1]).unwrap();
        assert_eq!(hit.name, "raw");
    }
}
