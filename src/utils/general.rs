use faer::Mat;
use std::cmp::PartialOrd;
use std::ops::AddAssign;

//////////////////
// VECTOR STUFF //
//////////////////

/// Flatten a nested vector
///
/// ### Params
///
/// * `vec` - The vector to flatten
///
/// ### Returns
///
/// The flattened vector
pub fn flatten_vector<I, T>(vec: I) -> Vec<T>
where
    I: IntoIterator,
    I::Item: IntoIterator<Item = T>,
{
    vec.into_iter().flatten().collect()
}

/// Get the maximum and minimum value of an array
///
/// ### Params
///
/// * `arr` - The array of values
///
/// ### Returns
///
/// Tuple of values with the first being the minimum and the second the maximum
pub fn array_max_min<T: PartialOrd + Copy>(arr: &[T]) -> (T, T) {
    let mut min_val = arr[0];
    let mut max_val = arr[0];
    for number in arr {
        if *number < min_val {
            min_val = *number
        }
        if *number > max_val {
            max_val = *number
        }
    }

    (min_val, max_val)
}

/// Calculate the cumulative sum over a vector
///
/// ### Params
///
/// * `x` - The slice of numerical values
///
/// ### Returns
///
/// The cumulative sum over the vector.
pub fn cumsum<T>(x: &[T]) -> Vec<T>
where
    T: Copy + Default + AddAssign<T>,
{
    let mut sum = T::default();
    x.iter()
        .map(|&val| {
            sum += val;
            sum
        })
        .collect()
}

//////////////////
// MATRIX STUFF //
//////////////////

/// Transforms a nested vector into a faer matrix
///
/// ### Params
///
/// * `nested_vec` - The nested vector to transform
/// * `col_wise` - Do the inner vectors represent columns or rows
///
/// ### Returns
///
/// The faer matrix
pub fn nested_vector_to_faer_mat(nested_vec: Vec<Vec<f64>>, col_wise: bool) -> Mat<f64> {
    let (nrow, ncol) = if col_wise {
        (nested_vec[0].len(), nested_vec.len())
    } else {
        (nested_vec.len(), nested_vec[0].len())
    };

    let data = flatten_vector(nested_vec);

    if col_wise {
        Mat::from_fn(nrow, ncol, |i, j| data[i + j * nrow])
    } else {
        Mat::from_fn(nrow, ncol, |i, j| data[j + i * ncol])
    }
}

///////////
// Tests //
///////////
