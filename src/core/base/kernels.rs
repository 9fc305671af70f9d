use rayon::iter::*;

///////////
// Enums //
///////////

/// Enum for the spatial connectivity kernel
#[derive(Clone, Debug, PartialEq)]
pub enum KernelType {
    /// `exp(-d² / (2l²))`
    Gaussian,
    /// `exp(-d² / l²)`; a Gaussian with bandwidth scaled by √2
    MistyRbf,
    /// `exp(-d / l)`
    Exponential,
    /// `max(1 - d/l, 0)`
    Linear,
}

////////////
// Params //
////////////

/// Parsing the kernel type
///
/// ### Params
///
/// * `s` - String to transform into `KernelType`
///
/// ### Returns
///
/// Returns the `KernelType`
pub fn parse_kernel_type(s: &str) -> Option<KernelType> {
    match s.to_lowercase().as_str() {
        "gaussian" => Some(KernelType::Gaussian),
        "misty_rbf" => Some(KernelType::MistyRbf),
        "exponential" => Some(KernelType::Exponential),
        "linear" => Some(KernelType::Linear),
        _ => None,
    }
}

//////////////////////
// Kernel functions //
//////////////////////

/// Gaussian connectivity kernel
///
/// Transforms a vector of distances into connectivity weights with the
/// following formula:
/// ```text
/// w(d) = e^(-d² / (2l²))
/// ```
///
/// ### Params
///
/// * `dist` - Vector of distances
/// * `bandwidth` - Decay length `l` controlling the interaction range
///
/// ### Returns
///
/// The resulting connectivity weights
pub fn kernel_gaussian(dist: &[f64], bandwidth: &f64) -> Vec<f64> {
    let denom = 2.0 * bandwidth * bandwidth;
    dist.par_iter().map(|d| f64::exp(-(d * d) / denom)).collect()
}

/// Misty-RBF connectivity kernel
///
/// Transforms a vector of distances into connectivity weights with the
/// following formula:
/// ```text
/// w(d) = e^(-d² / l²)
/// ```
///
/// Equivalent to the Gaussian kernel with the bandwidth scaled by √2.
///
/// ### Params
///
/// * `dist` - Vector of distances
/// * `bandwidth` - Decay length `l` controlling the interaction range
///
/// ### Returns
///
/// The resulting connectivity weights
pub fn kernel_misty_rbf(dist: &[f64], bandwidth: &f64) -> Vec<f64> {
    let denom = bandwidth * bandwidth;
    dist.par_iter().map(|d| f64::exp(-(d * d) / denom)).collect()
}

/// Exponential connectivity kernel
///
/// Transforms a vector of distances into connectivity weights with the
/// following formula:
/// ```text
/// w(d) = e^(-d / l)
/// ```
///
/// ### Params
///
/// * `dist` - Vector of distances
/// * `bandwidth` - Decay length `l` controlling the interaction range
///
/// ### Returns
///
/// The resulting connectivity weights
pub fn kernel_exponential(dist: &[f64], bandwidth: &f64) -> Vec<f64> {
    dist.par_iter().map(|d| f64::exp(-d / bandwidth)).collect()
}

/// Linear connectivity kernel
///
/// Transforms a vector of distances into connectivity weights with the
/// following formula:
/// ```text
/// w(d) = max(1 - d/l, 0)
/// ```
///
/// The weight is the remaining fraction of the bandwidth, floored at zero.
/// The upper bound is not clipped, so a negative distance yields a weight
/// above 1.
///
/// ### Params
///
/// * `dist` - Vector of distances
/// * `bandwidth` - Decay length `l` controlling the interaction range
///
/// ### Returns
///
/// The resulting connectivity weights
pub fn kernel_linear(dist: &[f64], bandwidth: &f64) -> Vec<f64> {
    dist.par_iter().map(|d| (1.0 - d / bandwidth).max(0.0)).collect()
}

//////////////
// Dispatch //
//////////////

/// Apply the selected kernel to a vector of distances
///
/// Distances of `f64::INFINITY` (the zone-of-indifference sentinel) map to a
/// weight of exactly 0.0 for every kernel.
///
/// ### Params
///
/// * `dist` - Vector of distances
/// * `kernel` - Which kernel to apply
/// * `bandwidth` - Decay length `l` controlling the interaction range
///
/// ### Returns
///
/// The resulting connectivity weights
pub fn apply_kernel(dist: &[f64], kernel: &KernelType, bandwidth: &f64) -> Vec<f64> {
    match kernel {
        KernelType::Gaussian => kernel_gaussian(dist, bandwidth),
        KernelType::MistyRbf => kernel_misty_rbf(dist, bandwidth),
        KernelType::Exponential => kernel_exponential(dist, bandwidth),
        KernelType::Linear => kernel_linear(dist, bandwidth),
    }
}

///////////
// Tests //
///////////
