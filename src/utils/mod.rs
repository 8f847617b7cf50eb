mod maths_utils;
mod perf;
mod time_utils;

pub use time_utils::{
    AppInstant, Deadline, TimeUtils, epoch_ms_to_date, epoch_ms_to_date_string,
};

pub use maths_utils::{
    argmax, is_effectively_constant, linear_fit, log_returns, mean_and_stddev, median, remap, sample_variance,
    sigmoid,
};
