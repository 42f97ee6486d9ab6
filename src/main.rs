fn main() {
    raft_flow_demo::run_cli();
}
