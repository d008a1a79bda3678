//! Drives face-recognition backends (CompreFace, Double Take) with a
//! labeled image dataset: enroll every image, or classify every image and
//! score the backend against the folder labels.

pub mod shared {
    pub mod constants;
    pub mod image_item;
    pub mod outcome;
    pub mod run_config;
}

pub mod dataset {
    pub mod domain {
        pub mod batch_builder;
        pub mod label_extractor;
    }
    pub mod infrastructure;
}

pub mod backend {
    pub mod domain {
        pub mod backend_client;
    }
    pub mod infrastructure;
}

pub mod recognition {
    pub mod domain {
        pub mod decision_policy;
    }
}

pub mod pipeline {
    pub mod batch_processor;
    pub mod error_action_handler;
    pub mod pipeline_executor;
    pub mod pipeline_logger;
    pub mod process_dataset_use_case;
    pub mod run_aggregator;
    pub mod infrastructure {
        pub mod threaded_pipeline_executor;
    }
}

#[cfg(test)]
mod test_support;
