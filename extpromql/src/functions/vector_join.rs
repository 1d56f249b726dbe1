use crate::value::Vector;

/// `vector_join(v...)`: all rows of all arguments, in argument order.
pub fn vector_join(vectors: Vec<Vector>) -> Vector {
    vectors.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::tests::{render, sample};

    #[test]
    fn test_vector_join() {
        let out = vector_join(vec![
            vec![sample(&[("a", "1")], 0, 1.0)],
            vec![],
            vec![sample(&[("b", "2")], 0, 2.0), sample(&[("a", "1")], 0, 3.0)],
        ]);
        assert_eq!(render(&out), ["{a=1} 1", "{b=2} 2", "{a=1} 3"]);
        assert!(vector_join(vec![]).is_empty());
    }
}
