mod comm_group;
mod workload_json;
