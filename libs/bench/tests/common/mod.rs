pub mod dataset_utils;
