mod shutdown_case;
