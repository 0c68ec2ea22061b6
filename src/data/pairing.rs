/// Same-class reference pairing
use rand::Rng;

/// Pair every sample with a different sample of the same class.
///
/// Classes are visited in label order `0..num_classes`; within a class the
/// anchors keep their original order and each draws its partner uniformly
/// from the other members. Partners are drawn independently, so one sample
/// can be the partner of several anchors.
///
/// Every class present in `labels` needs at least two members. Classes with
/// no members contribute nothing. A label outside `0..num_classes` is a
/// `Config` error, so every sample is always an anchor.
pub fn pair_same_class<R: Rng + ?Sized>(
    labels: &[i64],
    num_classes: usize,
    rng: &mut R,
) -> crate::Result<Vec<(usize, usize)>> {
    if let Some(&label) = labels
        .iter()
        .find(|&&y| usize::try_from(y).map_or(true, |y| y >= num_classes))
    {
        return Err(crate::DataError::Config(format!(
            "label {} is outside the class vocabulary 0..{}",
            label, num_classes
        )));
    }

    let mut pairs = Vec::with_capacity(labels.len());

    for class in 0..num_classes {
        let members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|&(_, &y)| y == class as i64)
            .map(|(i, _)| i)
            .collect();

        if members.len() == 1 {
            return Err(crate::DataError::EmptyPairing { class, members: 1 });
        }

        for (pos, &anchor) in members.iter().enumerate() {
            // Skip over the anchor's own slot
            let mut pick = rng.gen_range(0..members.len() - 1);
            if pick >= pos {
                pick += 1;
            }
            pairs.push((anchor, members[pick]));
        }
    }

    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    #[test]
    fn test_every_anchor_once_same_class_never_self() -> crate::Result<()> {
        let labels = vec![0, 1, 2, 0, 1, 2, 0, 0, 1, 2, 2];
        let mut rng = StdRng::seed_from_u64(11);

        for _ in 0..200 {
            let pairs = pair_same_class(&labels, 3, &mut rng)?;
            assert_eq!(pairs.len(), labels.len());

            let mut anchors: Vec<usize> = pairs.iter().map(|&(a, _)| a).collect();
            anchors.sort_unstable();
            assert_eq!(anchors, (0..labels.len()).collect::<Vec<_>>());

            for &(a, r) in &pairs {
                assert_ne!(a, r);
                assert_eq!(labels[a], labels[r]);
            }
        }

        Ok(())
    }

    #[test]
    fn test_pairs_grouped_by_class() -> crate::Result<()> {
        let labels = vec![1, 0, 1, 0];
        let mut rng = StdRng::seed_from_u64(0);

        let pairs = pair_same_class(&labels, 2, &mut rng)?;
        let anchors: Vec<usize> = pairs.iter().map(|&(a, _)| a).collect();
        assert_eq!(anchors, vec![1, 3, 0, 2]);

        // Two-member classes have exactly one possible partner
        assert_eq!(pairs, vec![(1, 3), (3, 1), (0, 2), (2, 0)]);

        Ok(())
    }

    #[test]
    fn test_seeded_pairing_is_reproducible() -> crate::Result<()> {
        let labels: Vec<i64> = (0..40).map(|i| i % 4).collect();

        let a = pair_same_class(&labels, 4, &mut StdRng::seed_from_u64(42))?;
        let b = pair_same_class(&labels, 4, &mut StdRng::seed_from_u64(42))?;
        assert_eq!(a, b);

        Ok(())
    }

    #[test]
    fn test_partner_draw_covers_all_candidates() -> crate::Result<()> {
        let labels = vec![0; 4];
        let mut rng = StdRng::seed_from_u64(3);
        let mut seen: HashMap<usize, usize> = HashMap::new();

        for _ in 0..400 {
            let pairs = pair_same_class(&labels, 1, &mut rng)?;
            *seen.entry(pairs[0].1).or_default() += 1;
        }

        assert!(!seen.contains_key(&0));
        for r in 1..4 {
            assert!(seen[&r] > 60, "partner {} drawn {} times", r, seen[&r]);
        }

        Ok(())
    }

    #[test]
    fn test_singleton_class_fails() {
        let labels = vec![0, 0, 1];
        let mut rng = StdRng::seed_from_u64(1);

        let err = pair_same_class(&labels, 2, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            crate::DataError::EmptyPairing { class: 1, members: 1 }
        ));
    }

    #[test]
    fn test_out_of_vocabulary_label_rejected() {
        let mut rng = StdRng::seed_from_u64(4);

        for labels in [vec![0, 0, 2, 2], vec![0, 0, -1, 1, 1]] {
            let result = pair_same_class(&labels, 2, &mut rng);
            assert!(matches!(result, Err(crate::DataError::Config(_))));
        }
    }

    #[test]
    fn test_absent_class_contributes_nothing() -> crate::Result<()> {
        let labels = vec![2, 2, 2];
        let mut rng = StdRng::seed_from_u64(5);

        let pairs = pair_same_class(&labels, 3, &mut rng)?;
        assert_eq!(pairs.len(), 3);

        Ok(())
    }
}
