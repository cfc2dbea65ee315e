mod correlator;
mod token_flow_client;
